pub mod init;
pub mod systems;
