//! Durable task state on the filesystem.
//!
//! Layout, one directory per task id under the state directory:
//!
//! ```text
//! <tasks_dir>/
//!   <task_id>/
//!     state.json
//!     subtasks/
//!       <task_id>-part<k>.json
//! ```

pub mod lock;
pub mod store;

pub use lock::StateLock;
pub use store::TaskStateStore;
