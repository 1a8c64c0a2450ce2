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

//! Synchronous observer fan-out.
//!
//! Each engine defines its own observer trait with one method per
//! notification kind; an [`ObserverSet`] holds the subscribers and delivers
//! notifications in subscription order. Delivery happens on a snapshot of the
//! subscriber list, so an observer may subscribe further observers from
//! inside a callback without deadlocking.

use parking_lot::RwLock;
use std::sync::Arc;

pub struct ObserverSet<O: ?Sized> {
    observers: RwLock<Vec<Arc<O>>>,
}

impl<O: ?Sized> Default for ObserverSet<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> ObserverSet<O> {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer. Observers are never removed.
    pub fn subscribe(&self, observer: Arc<O>) {
        self.observers.write().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Invoke `f` on every observer, in subscription order.
    pub fn notify(&self, mut f: impl FnMut(&O)) {
        let snapshot: Vec<Arc<O>> = self.observers.read().clone();
        for observer in &snapshot {
            f(observer);
        }
    }
}
