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

//! Shared types for the BMC control-plane workspace: the bus subject
//! grammar, the closed error-kind sum, lifecycle state machines, and the
//! `Service` descriptor every supervised component implements.

pub mod deadline;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod service;
pub mod subject;

pub use error::{CoreError, RpcCode};
pub use service::{ChildSpec, ExitCause, RestartPolicy, Service};
pub use subject::{Subject, SubjectPattern};
