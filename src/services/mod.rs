pub mod audit;
pub mod closures;
pub mod posting;
pub mod reversal;
