pub mod dynamo;
pub mod memory;
