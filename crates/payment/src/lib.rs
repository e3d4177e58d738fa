//! Payment aggregate.
//!
//! Keeps a local mirror of every loan announced with `LoanCreated` and
//! records at most one payment per installment. Each payment is announced
//! with `PaymentPaid`.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{PaymentError, Result};
pub use memory::InMemoryPaymentRepository;
pub use model::{
    DEFAULT_PAYMENT_METHOD, LoanMirror, Payment, PaymentReceipt, PaymentRequest, ScheduleMirror,
};
pub use postgres::PostgresPaymentRepository;
pub use repository::PaymentRepository;
pub use service::PaymentService;
