use super::support::FakeTransport;
use crate::i2c::{field_mask, I2cBus, I2cDevice, I2cError, RegisterTransport};

const DEV: u8 = 0x10;
const REG: u8 = 0x20;

#[test]
fn field_mask_covers_datasheet_conventions() {
    // whole byte
    assert_eq!(field_mask(7, 8), 0xFF);
    // low nibble
    assert_eq!(field_mask(3, 4), 0x0F);
    // single bit
    assert_eq!(field_mask(4, 1), 0x10);
    assert_eq!(field_mask(0, 1), 0x01);
    // WHO_AM_I style field, bits 6..=1
    assert_eq!(field_mask(6, 6), 0b0111_1110);
}

#[test]
#[should_panic(expected = "invalid bit-field")]
fn zero_length_fields_are_caught_in_debug_builds() {
    field_mask(7, 0);
}

#[test]
#[should_panic(expected = "invalid bit-field")]
fn fields_running_past_bit_zero_are_caught_in_debug_builds() {
    let bus = FakeTransport::new();
    bus.preset(DEV, REG, 0xFF);
    let _ = bus.read_bits(DEV, REG, 3, 5);
}

#[test]
fn read_bits_right_aligns_the_field() {
    let bus = FakeTransport::new();
    bus.preset(DEV, REG, 0b1011_0101);

    assert_eq!(bus.read_bits(DEV, REG, 7, 8), Ok(0b1011_0101));
    assert_eq!(bus.read_bits(DEV, REG, 6, 3), Ok(0b011));
    assert_eq!(bus.read_bits(DEV, REG, 7, 1), Ok(1));
    assert_eq!(bus.read_bits(DEV, REG, 3, 2), Ok(0b01));
    assert_eq!(bus.read_bits(DEV, REG, 0, 1), Ok(1));
}

#[test]
fn write_bits_is_mask_exact() {
    // for every valid (start, length) field and a value that fits, a write
    // followed by a read returns the value and leaves all other bits alone
    let initial = 0b1010_1010u8;

    for bit_start in 0..8u8 {
        for length in 1..=(bit_start + 1) {
            let all_ones = ((1u16 << length) - 1) as u8;
            for value in [0u8, all_ones, 0b0101_0101 & all_ones] {
                let bus = FakeTransport::new();
                bus.preset(DEV, REG, initial);

                bus.write_bits(DEV, REG, bit_start, length, value).unwrap();
                assert_eq!(bus.read_bits(DEV, REG, bit_start, length), Ok(value));

                let mask = field_mask(bit_start, length);
                assert_eq!(
                    bus.register(DEV, REG) & !mask,
                    initial & !mask,
                    "bits outside field ({}, {}) were disturbed",
                    bit_start,
                    length
                );
            }
        }
    }
}

#[test]
fn write_bit_sets_and_clears() {
    let bus = FakeTransport::new();
    bus.preset(DEV, REG, 0b0000_1000);

    bus.write_bit(DEV, REG, 6, true).unwrap();
    assert_eq!(bus.register(DEV, REG), 0b0100_1000);

    bus.write_bit(DEV, REG, 3, false).unwrap();
    assert_eq!(bus.register(DEV, REG), 0b0100_0000);
}

#[test]
fn device_scopes_the_address() {
    let bus = FakeTransport::new();
    let device = I2cDevice::new(&bus, 0x42);

    device.write_byte(REG, 0xAB).unwrap();
    assert_eq!(bus.register(0x42, REG), 0xAB);
    assert_eq!(bus.register(DEV, REG), 0x00);

    bus.preset(0x42, REG + 1, 0x5A);
    assert_eq!(device.read_byte(REG + 1), Ok(0x5A));
}

#[test]
fn failed_reads_and_writes_surface_to_the_caller() {
    let bus = FakeTransport::new();

    bus.fail_reads(true);
    assert!(matches!(
        bus.read_bits(DEV, REG, 6, 3),
        Err(I2cError::HardwareError(_))
    ));
    // write_bits needs the read-modify-write read first
    assert!(matches!(
        bus.write_bits(DEV, REG, 6, 3, 0b101),
        Err(I2cError::HardwareError(_))
    ));

    bus.fail_reads(false);
    bus.fail_writes(true);
    assert!(matches!(
        bus.write_bit(DEV, REG, 0, true),
        Err(I2cError::HardwareError(_))
    ));
}

#[test]
fn opening_a_missing_bus_fails_without_leaking() {
    let path = "/dev/i2c-gpiohelper-does-not-exist";

    let first = I2cBus::open(path);
    assert!(matches!(first, Err(I2cError::DeviceUnavailable(_))));

    // a second attempt fails the same way, not with an "already open" error
    let second = I2cBus::open(path);
    assert!(matches!(second, Err(I2cError::DeviceUnavailable(_))));
}
