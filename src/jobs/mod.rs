pub mod random_transfer;
pub mod token_operations;

pub use random_transfer::{PercentageRange, RandomTransferSelector};
pub use token_operations::{TokenInfo, TokenOperations};
