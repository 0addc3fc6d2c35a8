//! Task combinators: ways to compose multiple awaitables without hand
//! rolling the polling loop each time, adapted to `Future`/`.await`.

mod finally;
mod schedule_on;
mod task_group;
mod task_scope;
mod timeout;
mod when_any;

pub use finally::finally;
pub use schedule_on::schedule_on;
pub use task_group::TaskGroup;
pub use task_scope::TaskScope;
pub use timeout::{sleep, with_timeout};
pub use when_any::when_any;
