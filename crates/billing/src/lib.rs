//! Billing aggregate.
//!
//! Owns customers, loans and their amortization schedules. Loans are
//! announced to the payment service with `LoanCreated`; installments are
//! marked paid when the matching `PaymentPaid` event is consumed.

pub mod amortization;
pub mod consumer;
pub mod customer;
pub mod delinquency;
pub mod error;
pub mod loan;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod service;

pub use amortization::{Installment, LoanPolicy, generate_schedule};
pub use customer::{Customer, NewCustomer};
pub use delinquency::is_delinquent;
pub use error::{BillingError, Result};
pub use loan::{Loan, Schedule};
pub use memory::InMemoryBillingRepository;
pub use model::{DelinquencyStatus, LoanView, OutstandingBalance, ScheduleView};
pub use postgres::PostgresBillingRepository;
pub use repository::BillingRepository;
pub use service::{BillingService, DELINQUENCY_PREFIX, OUTSTANDING_PREFIX};
