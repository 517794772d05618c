pub mod args;
pub mod publish;

pub use publish::run;
