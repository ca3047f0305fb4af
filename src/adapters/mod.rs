pub mod api;
pub mod db;
pub mod incontrol_client;
pub mod incontrol_http;
pub mod incontrol_replay;
