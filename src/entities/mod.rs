pub mod goal;
pub mod goal_entry;
pub mod subscription;
