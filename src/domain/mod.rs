pub mod actions;
pub mod constants;
pub mod crypto;
pub mod pe;
pub mod pkcs7;
