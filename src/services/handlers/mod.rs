pub mod consignment;
pub mod customer_loan;

pub use consignment::ConsignmentHandler;
pub use customer_loan::CustomerLoanHandler;
