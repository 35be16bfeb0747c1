pub mod init_config;
pub mod relays;
pub mod run;
