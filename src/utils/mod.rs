pub mod ensure;
pub mod naming;
pub mod validation;
