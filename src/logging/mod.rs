pub mod delivery_log;
