pub mod alert;
pub mod error;
pub mod logging;

pub use self::alert::ManagerNotifier;
pub use self::error::AppError;
