// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

pub mod connection;
pub mod memory;
pub(crate) mod row;
pub mod traits;

pub use connection::{ConnectionHandle, ConnectionManager, ScopedConnection};
pub use memory::{MemoryDatabase, MemoryTable};
pub use traits::StorageError;
