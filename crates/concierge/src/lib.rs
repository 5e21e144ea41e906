pub mod agent;
pub mod capabilities;
pub mod errors;
pub mod events;
pub mod identity;
pub mod models;
pub mod prompt_template;
pub mod protocol;
pub mod provisioner;
pub mod providers;
pub mod transcoder;
