//! Shared types for the lending services.

pub mod audit;
pub mod clock;
pub mod error;
pub mod money;
pub mod status;
pub mod types;

pub use audit::AuditStamp;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ErrorKind;
pub use money::{AMOUNT_SCALE, fits_amount_scale, round_currency};
pub use status::{PaymentStatus, UnknownPaymentStatus};
pub use types::{CustomerId, LoanId, PaymentId, ScheduleId};
