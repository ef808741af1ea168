pub mod dispatcher;
pub mod photo;
pub mod storage;
pub mod worker;
