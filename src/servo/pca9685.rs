// PCA9685 16-channel PWM controller over I2C
//
// Register map per the NXP datasheet: MODE1/MODE2 for power state, one
// PRESCALE register for the output frequency, and four registers per
// channel (ON_L/ON_H/OFF_L/OFF_H) holding 12-bit phase counts.

use std::thread;
use std::time::Duration;

use rppal::i2c::I2c;
use tracing::debug;

/// Default I2C address (all address pins low)
pub const DEFAULT_ADDRESS: u16 = 0x40;

/// Servo refresh rate
pub const SERVO_FREQ_HZ: f32 = 50.0;

/// Internal oscillator frequency
const OSC_HZ: f32 = 25_000_000.0;

/// Pulse widths mapped to 0 and 180 degrees
pub const PULSE_MIN_US: f32 = 500.0;
pub const PULSE_MAX_US: f32 = 2500.0;

/// Register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    Mode1 = 0x00,
    Mode2 = 0x01,
    Led0OnL = 0x06, // channel n at Led0OnL + 4*n
    AllLedOnL = 0xFA,
    Prescale = 0xFE,
}

// MODE1 bits
const MODE1_RESTART: u8 = 0x80;
const MODE1_AUTO_INC: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

// MODE2 bits
const MODE2_OUTDRV: u8 = 0x04;

/// Error types for the PWM layer
#[derive(Debug, thiserror::Error)]
pub enum PwmError {
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("PWM channel {index} out of range (0-15)")]
    Channel { index: u8 },
}

pub type Result<T> = std::result::Result<T, PwmError>;

/// Anything that can point a servo channel at an angle.
///
/// One physical write per call, no internal delay. Implemented by the real
/// PCA9685 and by [`DryRunBackend`] for running without hardware.
pub trait PwmBackend: Send {
    /// Drive `channel` to `degrees` (clamped to 0-180).
    fn set_angle(&mut self, channel: u8, degrees: f32) -> Result<()>;

    /// Stop driving all channels so the servos go limp.
    fn release_all(&mut self) -> Result<()> {
        Ok(())
    }
}

/// PCA9685 on a Raspberry Pi I2C bus
pub struct Pca9685 {
    i2c: I2c,
}

impl Pca9685 {
    /// Open the controller on the given I2C bus at the default address
    pub fn open(bus: u8) -> Result<Self> {
        Self::open_with_address(bus, DEFAULT_ADDRESS)
    }

    /// Open with a custom I2C address
    pub fn open_with_address(bus: u8, address: u16) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;

        let mut pwm = Self { i2c };
        pwm.initialize()?;
        Ok(pwm)
    }

    /// Reset, set the servo frequency, and wake the oscillator
    fn initialize(&mut self) -> Result<()> {
        self.i2c
            .smbus_write_byte(Register::Mode2 as u8, MODE2_OUTDRV)?;
        self.i2c
            .smbus_write_byte(Register::Mode1 as u8, MODE1_AUTO_INC)?;

        // Prescale can only be written while the oscillator sleeps
        let prescale = prescale_for(SERVO_FREQ_HZ);
        let mode1 = self.i2c.smbus_read_byte(Register::Mode1 as u8)?;
        self.i2c
            .smbus_write_byte(Register::Mode1 as u8, (mode1 & !MODE1_RESTART) | MODE1_SLEEP)?;
        self.i2c
            .smbus_write_byte(Register::Prescale as u8, prescale)?;
        self.i2c.smbus_write_byte(Register::Mode1 as u8, mode1)?;

        // Oscillator needs 500us to stabilize before restart
        thread::sleep(Duration::from_millis(1));
        self.i2c
            .smbus_write_byte(Register::Mode1 as u8, mode1 | MODE1_RESTART | MODE1_AUTO_INC)?;

        debug!("PCA9685 initialized, prescale={}", prescale);
        Ok(())
    }

    /// Write a raw 12-bit on/off pair to a channel
    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
        if channel > 15 {
            return Err(PwmError::Channel { index: channel });
        }
        let reg = Register::Led0OnL as u8 + 4 * channel;
        let data = [
            (on & 0xFF) as u8,
            (on >> 8) as u8,
            (off & 0xFF) as u8,
            (off >> 8) as u8,
        ];
        self.i2c.block_write(reg, &data)?;
        Ok(())
    }

}

impl PwmBackend for Pca9685 {
    fn set_angle(&mut self, channel: u8, degrees: f32) -> Result<()> {
        let counts = angle_to_counts(degrees);
        debug!("ch {} -> {:.1} deg ({} counts)", channel, degrees, counts);
        self.set_pwm(channel, 0, counts)
    }

    fn release_all(&mut self) -> Result<()> {
        // Full-off bit in OFF_H
        self.i2c
            .block_write(Register::AllLedOnL as u8, &[0, 0, 0, 0x10])?;
        Ok(())
    }
}

/// Backend that logs writes instead of touching hardware.
///
/// Used with `--dry-run` to exercise the full gait stack on a dev machine.
#[derive(Debug, Default)]
pub struct DryRunBackend;

impl PwmBackend for DryRunBackend {
    fn set_angle(&mut self, channel: u8, degrees: f32) -> Result<()> {
        if channel > 15 {
            return Err(PwmError::Channel { index: channel });
        }
        debug!("dry-run: ch {} -> {:.1} deg", channel, degrees);
        Ok(())
    }
}

/// Prescale value for a target PWM frequency
fn prescale_for(freq_hz: f32) -> u8 {
    let prescale = (OSC_HZ / (4096.0 * freq_hz)).round() - 1.0;
    prescale.clamp(3.0, 255.0) as u8
}

/// Convert an angle in degrees to a 12-bit off-count at the servo frequency
fn angle_to_counts(degrees: f32) -> u16 {
    let degrees = degrees.clamp(0.0, 180.0);
    let pulse_us = PULSE_MIN_US + degrees / 180.0 * (PULSE_MAX_US - PULSE_MIN_US);
    let period_us = 1_000_000.0 / SERVO_FREQ_HZ;
    (pulse_us / period_us * 4096.0).round() as u16
}
