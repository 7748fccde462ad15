pub mod raw;
pub mod report;
pub mod work_item;
