pub mod publish;
pub mod serve;
pub mod upcoming;
pub mod validate;
