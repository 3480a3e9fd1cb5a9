use std::{thread, time::Duration};

use anyhow::{bail, Context};
use common::types::{hw::MagneticFrame, units::Microtesla};
use rppal::i2c::I2c;
use tracing::{debug, instrument};

/// Magnetometer inside the MPU-9250, reachable once the MPU is in bypass mode
pub struct Ak8963 {
    i2c: I2c,
    /// Factory sensitivity adjustment per axis
    adjustment: [f32; 3],
    last: Option<MagneticFrame>,
}

impl Ak8963 {
    pub const I2C_ADDRESS: u8 = 0x0C;

    /// uT per LSB in 16 bit mode
    const SENSITIVITY: f32 = 0.15;

    #[instrument(level = "debug")]
    pub fn new(bus: u8, address: u8) -> anyhow::Result<Self> {
        let mut i2c = I2c::with_bus(bus).context("Open i2c")?;
        i2c.set_slave_address(address as u16)
            .context("Set address for AK8963")?;

        let mut this = Self {
            i2c,
            adjustment: [1.0; 3],
            last: None,
        };
        this.initialize().context("Initialize")?;

        Ok(this)
    }

    /// Reading rotated into the accelerometer's axes
    ///
    /// The AK8963 die is mounted with X and Y swapped and Z inverted relative to
    /// the accelerometer, so the same axis remap applies to every sensor.
    /// Polling faster than the 100Hz output rate repeats the previous reading.
    #[instrument(level = "trace", skip(self), ret)]
    pub fn read_frame(&mut self) -> anyhow::Result<MagneticFrame> {
        let Some(raw) = self.read_raw_frame().context("Read raw frame")? else {
            return self.last.context("No magnetometer data yet");
        };

        let axis = |idx: usize| {
            let value = (raw[idx * 2 + 1] as u16) << 8 | raw[idx * 2] as u16;
            value as i16 as f32 * Self::SENSITIVITY * self.adjustment[idx]
        };

        let (native_x, native_y, native_z) = (axis(0), axis(1), axis(2));

        let frame = MagneticFrame {
            mag_x: Microtesla(native_y),
            mag_y: Microtesla(native_x),
            mag_z: Microtesla(-native_z),
        };
        self.last = Some(frame);

        Ok(frame)
    }
}

impl Ak8963 {
    const REG_WIA: u8 = 0x00;
    const REG_ST1: u8 = 0x02;
    const REG_HXL: u8 = 0x03;
    const REG_CNTL1: u8 = 0x0A;
    const REG_ASAX: u8 = 0x10;

    const ID: u8 = 0x48;

    const MODE_POWER_DOWN: u8 = 0x00;
    const MODE_FUSE_ROM: u8 = 0x0F;
    /// 16 bit output, continuous measurement at 100Hz
    const MODE_CONTINUOUS_2: u8 = 0x16;

    const ST1_DRDY: u8 = 0x01;
    const ST2_HOFL: u8 = 0x08;

    fn initialize(&mut self) -> anyhow::Result<()> {
        debug!("Initializing AK8963 (magnetometer)");

        let mut id = [0];
        self.i2c
            .write_read(&[Self::REG_WIA], &mut id)
            .context("Request id")?;
        if id[0] != Self::ID {
            bail!("Unexpected WIA {:#04x}", id[0]);
        }

        self.set_mode(Self::MODE_POWER_DOWN)?;
        self.set_mode(Self::MODE_FUSE_ROM)?;

        let mut asa = [0; 3];
        self.i2c
            .write_read(&[Self::REG_ASAX], &mut asa)
            .context("Read sensitivity adjustment")?;
        self.adjustment = asa.map(|it| (it as f32 - 128.0) / 256.0 + 1.0);

        self.set_mode(Self::MODE_POWER_DOWN)?;
        self.set_mode(Self::MODE_CONTINUOUS_2)?;

        debug!("Initializing AK8963 complete");

        Ok(())
    }

    fn set_mode(&mut self, mode: u8) -> anyhow::Result<()> {
        self.i2c
            .write(&[Self::REG_CNTL1, mode])
            .with_context(|| format!("Set mode {mode:#04x}"))?;

        // Mode transitions need 100us
        thread::sleep(Duration::from_millis(1));

        Ok(())
    }

    /// Six data bytes, little endian, `None` if no conversion finished since the last read
    fn read_raw_frame(&mut self) -> anyhow::Result<Option<[u8; 6]>> {
        let mut status = [0];
        self.i2c
            .write_read(&[Self::REG_ST1], &mut status)
            .context("Read status")?;
        if status[0] & Self::ST1_DRDY == 0 {
            return Ok(None);
        }

        // Data bytes then ST2, reading ST2 releases the data registers
        let mut input = [0; 7];
        self.i2c
            .write_read(&[Self::REG_HXL], &mut input)
            .context("Read mag frame")?;
        if input[6] & Self::ST2_HOFL != 0 {
            bail!("Magnetic sensor overflow");
        }

        let mut raw = [0; 6];
        raw.copy_from_slice(&input[..6]);

        Ok(Some(raw))
    }
}
