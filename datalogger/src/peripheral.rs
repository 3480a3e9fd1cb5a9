pub mod ak8963;
pub mod isp2_uart;
pub mod mpu9250;
