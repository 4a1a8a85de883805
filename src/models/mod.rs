pub mod analysis;
pub mod gas;
pub mod notification;
pub mod response;
pub mod stream;
pub mod swap;
pub mod transaction;

pub use analysis::*;
pub use gas::*;
pub use notification::*;
pub use response::*;
pub use stream::*;
pub use swap::*;
pub use transaction::*;
