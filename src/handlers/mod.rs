pub mod gas;
pub mod health;
pub mod dashboard;
pub mod notifications;
pub mod stats;
pub mod stream;

pub use gas::*;
pub use health::*;
pub use dashboard::*;
pub use notifications::*;
pub use stats::*;
pub use stream::*;
