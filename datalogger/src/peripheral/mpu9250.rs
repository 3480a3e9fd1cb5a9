use std::{thread, time::Duration};

use anyhow::{bail, Context};
use common::types::{
    hw::InertialFrame,
    units::{Celsius, Dps, GForce},
};
use rppal::i2c::I2c;
use tracing::{debug, instrument};

/// Accelerometer, gyroscope and die temperature half of the MPU-9250
pub struct Mpu9250 {
    i2c: I2c,
}

impl Mpu9250 {
    pub const I2C_BUS: u8 = 1;
    pub const I2C_ADDRESS: u8 = 0x68;

    /// LSB per g at +-2g
    const ACCEL_SENSITIVITY: f32 = 16384.0;
    /// LSB per dps at +-250dps
    const GYRO_SENSITIVITY: f32 = 131.0;
    const TEMP_SENSITIVITY: f32 = 333.87;
    const TEMP_OFFSET: f32 = 21.0;

    #[instrument(level = "debug")]
    pub fn new(bus: u8, address: u8) -> anyhow::Result<Self> {
        let mut i2c = I2c::with_bus(bus).context("Open i2c")?;
        i2c.set_slave_address(address as u16)
            .context("Set address for MPU9250")?;

        let mut this = Self { i2c };
        this.initialize().context("Initialize")?;

        Ok(this)
    }

    #[instrument(level = "trace", skip(self), ret)]
    pub fn read_frame(&mut self) -> anyhow::Result<InertialFrame> {
        let raw = self.read_raw_frame().context("Read raw frame")?;

        let word = |idx: usize| ((raw[idx] as u16) << 8 | raw[idx + 1] as u16) as i16 as f32;

        Ok(InertialFrame {
            accel_x: GForce(word(0) / Self::ACCEL_SENSITIVITY),
            accel_y: GForce(word(2) / Self::ACCEL_SENSITIVITY),
            accel_z: GForce(word(4) / Self::ACCEL_SENSITIVITY),
            tempature: Celsius(word(6) / Self::TEMP_SENSITIVITY + Self::TEMP_OFFSET),
            gyro_x: Dps(word(8) / Self::GYRO_SENSITIVITY),
            gyro_y: Dps(word(10) / Self::GYRO_SENSITIVITY),
            gyro_z: Dps(word(12) / Self::GYRO_SENSITIVITY),
        })
    }
}

impl Mpu9250 {
    const REG_SMPLRT_DIV: u8 = 0x19;
    const REG_CONFIG: u8 = 0x1A;
    const REG_GYRO_CONFIG: u8 = 0x1B;
    const REG_ACCEL_CONFIG: u8 = 0x1C;
    const REG_ACCEL_CONFIG_2: u8 = 0x1D;
    const REG_INT_PIN_CFG: u8 = 0x37;
    const REG_ACCEL_XOUT_H: u8 = 0x3B;
    const REG_PWR_MGMT_1: u8 = 0x6B;
    const REG_WHO_AM_I: u8 = 0x75;

    /// MPU-9250 and MPU-9255
    const KNOWN_IDS: [u8; 2] = [0x71, 0x73];

    fn initialize(&mut self) -> anyhow::Result<()> {
        debug!("Initializing MPU9250 (gyro + accelerometer)");

        let mut id = [0];
        self.i2c
            .write_read(&[Self::REG_WHO_AM_I], &mut id)
            .context("Request id")?;
        if !Self::KNOWN_IDS.contains(&id[0]) {
            bail!("Unexpected WHO_AM_I {:#04x}", id[0]);
        }

        self.i2c
            .write(&[Self::REG_PWR_MGMT_1, 0x80])
            .context("Reset")?;
        thread::sleep(Duration::from_millis(100));

        // Best available clock source
        self.i2c
            .write(&[Self::REG_PWR_MGMT_1, 0x01])
            .context("Exit sleep")?;

        // 41Hz lowpass filter on the gyro and temperature
        self.i2c
            .write(&[Self::REG_CONFIG, 0x03])
            .context("Setup lowpass filter")?;

        // 200Hz sample rate
        self.i2c
            .write(&[Self::REG_SMPLRT_DIV, 0x04])
            .context("Setup sample rate")?;

        // 250 deg range
        self.i2c
            .write(&[Self::REG_GYRO_CONFIG, 0x00])
            .context("Setup gyro")?;

        // 2g range
        self.i2c
            .write(&[Self::REG_ACCEL_CONFIG, 0x00])
            .context("Setup accel")?;

        // 41Hz lowpass filter
        self.i2c
            .write(&[Self::REG_ACCEL_CONFIG_2, 0x03])
            .context("Setup accel")?;

        // Bypass mode puts the AK8963 directly on the bus
        self.i2c
            .write(&[Self::REG_INT_PIN_CFG, 0x02])
            .context("Enable bypass")?;

        // Delay to allow sensors to start up and stabilize
        thread::sleep(Duration::from_millis(100));

        debug!("Initializing MPU9250 complete");

        Ok(())
    }

    fn read_raw_frame(&mut self) -> anyhow::Result<[u8; 14]> {
        let mut input = [0; 14];

        self.i2c
            .write_read(&[Self::REG_ACCEL_XOUT_H], &mut input)
            .context("Burst read imu frame")?;

        Ok(input)
    }
}
