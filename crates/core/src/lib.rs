pub mod category;
pub mod clock;
pub mod error;
pub mod ids;
pub mod keyed;
pub mod task;

pub use category::{default_categories, Category, Color, NewCategory};
pub use error::CoreError;
pub use ids::*;
pub use keyed::{Integration, Setting, API_URL_SETTING};
pub use task::{normalize_task, NewTask, Priority, StoredTask, Task};
