pub mod decode;
pub mod mask;
