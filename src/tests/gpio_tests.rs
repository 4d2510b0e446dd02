use super::support::temp_file;
use crate::gpio::{GpioError, GpioPin, PinDirection, PinTrigger, PinValue, READ_FAILED};
use std::fs::{self, OpenOptions};

#[test]
fn sysfs_attribute_strings() {
    assert_eq!(PinDirection::In.to_string(), "in");
    assert_eq!(PinDirection::Out.to_string(), "out");

    assert_eq!(PinTrigger::None.to_string(), "none");
    assert_eq!(PinTrigger::Falling.to_string(), "falling");
    assert_eq!(PinTrigger::Rising.to_string(), "rising");
    assert_eq!(PinTrigger::Both.to_string(), "both");

    assert_eq!(PinValue::Off.to_string(), "off");
    assert_eq!(PinValue::On.to_string(), "on");
}

#[test]
fn exporting_an_invalid_line_is_a_config_error() {
    // the export control file rejects the bogus id (or does not exist at
    // all); either way construction must fail before a pin object exists
    let result = GpioPin::new(
        "this-line-does-not-exist",
        PinDirection::Out,
        PinTrigger::None,
    );
    assert!(matches!(result, Err(GpioError::ConfigError(_))));
}

#[test]
fn writing_an_input_pin_is_rejected_without_touching_the_stream() {
    let path = temp_file("input-pin", "1");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    let pin = GpioPin::with_value_file("7", PinDirection::In, file);

    assert!(matches!(pin.write_value(1), Err(GpioError::ConfigError(_))));
    assert!(matches!(
        pin.write(PinValue::On),
        Err(GpioError::ConfigError(_))
    ));

    // the stream contents are untouched
    assert_eq!(fs::read_to_string(&path).unwrap(), "1");
    drop(pin);
    let _ = fs::remove_file(&path);
}

#[test]
fn read_parses_one_character_from_the_stream_start() {
    let path = temp_file("read-pin", "1");
    let file = OpenOptions::new().read(true).open(&path).unwrap();
    let pin = GpioPin::with_value_file("8", PinDirection::In, file);

    // repeated reads seek back to the start instead of walking the stream
    assert_eq!(pin.read(), 1);
    assert_eq!(pin.read(), 1);

    drop(pin);
    let _ = fs::remove_file(&path);
}

#[test]
fn read_failures_return_the_sentinel() {
    let empty = temp_file("empty-pin", "");
    let file = OpenOptions::new().read(true).open(&empty).unwrap();
    let pin = GpioPin::with_value_file("9", PinDirection::In, file);
    assert_eq!(pin.read(), READ_FAILED);
    drop(pin);
    let _ = fs::remove_file(&empty);

    let garbage = temp_file("garbage-pin", "x");
    let file = OpenOptions::new().read(true).open(&garbage).unwrap();
    let pin = GpioPin::with_value_file("9", PinDirection::In, file);
    assert_eq!(pin.read(), READ_FAILED);
    drop(pin);
    let _ = fs::remove_file(&garbage);
}

#[test]
fn output_writes_land_in_the_stream() {
    let path = temp_file("output-pin", "");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    let pin = GpioPin::with_value_file("10", PinDirection::Out, file);

    pin.write(PinValue::On).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "1");

    drop(pin);
    let _ = fs::remove_file(&path);
}
