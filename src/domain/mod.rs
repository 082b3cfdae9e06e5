//! Domain types: the task record, its status state machine, and the
//! submission specification.

mod task;

pub use task::{new_task_id, Task, TaskSpec, TaskStatus};
