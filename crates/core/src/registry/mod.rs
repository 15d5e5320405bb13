// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory registries (C1 `SessionRegistry`, C2 `RoomRegistry`).

pub mod room;
pub mod session;

pub use room::{RoomEventSink, RoomFilter, RoomRegistry, RoomType, RoomView};
pub use session::{OutFrame, Session, SessionFilter, SessionRegistry, SessionView};
