pub(crate) mod files;
pub(crate) mod service;
pub(crate) mod session;
pub(crate) mod switcher;
pub(crate) mod tunnel_config;
