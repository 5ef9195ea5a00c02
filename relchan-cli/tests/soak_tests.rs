use relchan_cli::commands::soak::{self, SoakOptions};
use relchan_cli::wire_format;
use relchan_core::pipe::Faults;
use relchan_core::{ChannelConfig, WireFormat};
use std::time::Duration;

fn fast_config() -> ChannelConfig {
    ChannelConfig::new()
        .name("soak")
        .timeout(Duration::from_millis(50))
        .frame_timeout(Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(20))
}

#[test]
fn soak_clean_link() {
    let options = SoakOptions {
        messages: 30,
        size: 16,
        faults: Faults::none(),
        progress: false,
    };

    let report = soak::run(&fast_config(), &options).unwrap();
    assert!(report.is_perfect());
    assert_eq!(report.sent, 30);
}

#[test]
fn soak_lossy_link_still_delivers() {
    let options = SoakOptions {
        messages: 20,
        size: 32,
        faults: Faults::none().loss(0.15).seed(11),
        progress: false,
    };

    let report = soak::run(&fast_config(), &options).unwrap();
    assert_eq!(report.delivered, 20);
    assert!(report.in_order);
}

#[test]
fn soak_corrupting_link_with_crc() {
    let config = fast_config().wire(wire_format(WireFormat::default(), true, true));
    let options = SoakOptions {
        messages: 15,
        size: 24,
        faults: Faults::none().byte_loss(0.002).bit_flip(0.002).seed(3),
        progress: false,
    };

    let report = soak::execute(&config, &options).unwrap();
    assert!(report.is_perfect());
}

#[test]
fn soak_corrupting_link_with_xor_is_complete() {
    let options = SoakOptions {
        messages: 30,
        size: 24,
        faults: Faults::none().byte_loss(0.002).bit_flip(0.002).seed(5),
        progress: false,
    };

    let report = soak::run(&fast_config(), &options).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.delivered, 30);
    assert_eq!(report.is_perfect(), report.duplicates == 0);
}
