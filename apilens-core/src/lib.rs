// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Apilens Core
//!
//! Shared plumbing for the apilens engines: an injectable clock, observer
//! fan-out, stoppable background tasks, and id generation.

pub mod clock;
pub mod id;
pub mod observer;
pub mod schedule;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use id::{generate_id, random_suffix, time_based_session_id};
pub use observer::ObserverSet;
pub use schedule::BackgroundTask;
