// Register-mapped device drivers built on the I2C layer
pub mod mcp23017; // MCP23017 16-bit port expander
pub mod mpu6050; // MPU-6050 6-axis motion sensor
