pub mod completion_record;
