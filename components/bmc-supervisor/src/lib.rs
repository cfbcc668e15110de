// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A generic async-task supervision tree: bounded exponential back-off,
//! per-child restart policy, and escalation when a child restarts too many
//! times in a short window (spec.md §4.2). Generalizes the teacher's
//! per-process `Supervisor` (`components/sup/src/manager/service/supervisor.rs`)
//! from OS-process liveness checks to the `bmc_core::Service` trait.

pub mod backoff;
pub mod tree;

pub use tree::{EscalationError, SupervisionTree, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_WINDOW};
