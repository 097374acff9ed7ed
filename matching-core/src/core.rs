pub mod error;
pub mod escrow;
pub mod facade;
pub mod ledger;
pub mod order;
pub mod pair;
pub mod scanner;
pub mod settlement;
pub mod tick_index;
pub mod types;
pub mod validator;

pub mod prelude {
    pub use super::error::*;
    pub use super::escrow::*;
    pub use super::facade::*;
    pub use super::ledger::*;
    pub use super::order::*;
    pub use super::pair::*;
    pub use super::scanner::*;
    pub use super::settlement::*;
    pub use super::tick_index::*;
    pub use super::types::*;
    pub use super::validator::*;
}
