pub mod bitget;
pub mod collector;
pub mod coordinator;
pub mod invoker;
pub mod normalize;
pub mod pagination;
pub mod sharding;
pub mod worker;

pub use bitget::BitgetClient;
pub use collector::merge;
pub use coordinator::Coordinator;
pub use invoker::{LocalInvoker, RemoteInvoker, ShardInvoker};
pub use pagination::Paginator;
pub use worker::Worker;
