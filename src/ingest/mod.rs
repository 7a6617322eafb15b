pub mod garmindb;

pub use garmindb::GarminDbClient;
