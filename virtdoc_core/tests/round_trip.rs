use virtdoc_common::{Composite, Node, ResourceKind, VirtDocError};
use virtdoc_core::{compare, decode, encode, to_bytes, ChangeDetector, DivergenceCause};

fn quantity(unit: &str, value: &str) -> Node {
    Composite::new().with_attribute("unit", unit).with_text(value).into()
}

fn network_definition() -> Node {
    Composite::new()
        .with_attribute("connections", "2")
        .with_child("name", "default")
        .with_child("uuid", "9e5e4ac4-4d5c-4c1f-8e2a-7f2f6b0c9a11")
        .with_child(
            "forward",
            Composite::new()
                .with_attribute("mode", "nat")
                .with_child("nat", Composite::new().with_child("port", Composite::new()
                    .with_attribute("start", "1024")
                    .with_attribute("end", "65535"))),
        )
        .with_child("stp", true)
        .with_child("mtu", Composite::new().with_attribute("size", "9000"))
        .with_child(
            "ip",
            Composite::new()
                .with_attribute("address", "192.168.122.1")
                .with_attribute("netmask", "255.255.255.0")
                .with_child(
                    "dhcp",
                    Composite::new()
                        .with_child("range", Composite::new()
                            .with_attribute("start", "192.168.122.2")
                            .with_attribute("end", "192.168.122.254"))
                        .with_children(
                            "host",
                            vec![
                                Node::from(Composite::new()
                                    .with_attribute("mac", "52:54:00:00:00:01")
                                    .with_attribute("ip", "192.168.122.10")),
                                Node::from(Composite::new()
                                    .with_attribute("mac", "52:54:00:00:00:02")
                                    .with_attribute("ip", "192.168.122.11")),
                            ],
                        ),
                ),
        )
        .with_child("description", "NAT network & <bridge>")
        .into()
}

#[test]
fn test_round_trip_network_definition() {
    let tree = network_definition();
    let text = encode(&tree, "network").unwrap();
    let decoded = decode(&text).unwrap();

    let result = compare(&tree, &decoded, "network").unwrap();
    assert!(result.is_equal(), "diverged: {:?}", result.divergence);
}

#[test]
fn test_round_trip_sized_volume() {
    let tree: Node = Composite::new()
        .with_attribute("type", "file")
        .with_child("name", "disk0.qcow2")
        .with_child("capacity", quantity("GiB", "20"))
        .with_child("allocation", quantity("bytes", "0"))
        .into();

    let decoded = decode(&encode(&tree, "volume").unwrap()).unwrap();
    assert!(compare(&tree, &decoded, "volume").unwrap().is_equal());
}

#[test]
fn test_round_trip_emptied_members() {
    let tree: Node = Composite::new()
        .with_child("devices", Composite::new().with_children("hostdev", Vec::<Node>::new()))
        .with_child("features", Composite::new().with_child("pae", false))
        .with_child("name", "x")
        .into();

    let text = encode(&tree, "domain").unwrap();
    assert_eq!(text, "<domain><devices/><features/><name>x</name></domain>");

    let result = compare(&tree, &decode(&text).unwrap(), "domain").unwrap();
    assert!(result.is_equal(), "diverged: {:?}", result.divergence);
}

#[test]
fn test_decode_then_encode_scenario() {
    let decoded = decode(r#"<domain type="kvm"><name>test</name></domain>"#).unwrap();
    let expected: Node = Composite::new()
        .with_attribute("type", "kvm")
        .with_child("name", "test")
        .into();
    assert_eq!(decoded, expected);

    let again = decode(&encode(&decoded, "domain").unwrap()).unwrap();
    assert!(compare(&decoded, &again, "domain").unwrap().is_equal());
}

#[test]
fn test_memory_in_different_units_scenario() {
    let desired: Node = Composite::new()
        .with_child("name", "web")
        .with_child("memory", quantity("GiB", "1"))
        .into();
    let observed = decode(r#"<domain><name>web</name><memory unit="MiB">1024</memory></domain>"#).unwrap();

    assert!(compare(&desired, &observed, "domain").unwrap().is_equal());
}

#[test]
fn test_unit_aware_equality() {
    assert!(compare(&quantity("KB", "1"), &quantity("b", "1000"), "domain")
        .unwrap()
        .is_equal());
    assert!(compare(&quantity("KiB", "1024"), &quantity("MiB", "1"), "domain")
        .unwrap()
        .is_equal());

    let bare: Node = Composite::new().with_child("memory", "1024").into();
    let sized: Node = Composite::new().with_child("memory", quantity("KiB", "1024")).into();
    let result = compare(&sized, &bare, "domain").unwrap();
    assert_eq!(result.path(), Some("domain.memory"));
    assert_eq!(result.cause(), Some(&DivergenceCause::MissingUnitAttribute));
}

#[test]
fn test_unlisted_label_compares_literally() {
    // Only registered labels are normalized
    let result = compare(&quantity("KiB", "1024"), &quantity("MiB", "1"), "network").unwrap();
    assert!(!result.is_equal());
    assert_eq!(result.path(), Some("network._unit"));
}

#[test]
fn test_invalid_unit_is_an_error() {
    let err = compare(&quantity("KxB", "1"), &quantity("b", "1"), "domain").unwrap_err();
    assert!(matches!(err, VirtDocError::InvalidUnit { .. }));

    let err = compare(&quantity("KiB", "lots"), &quantity("b", "1"), "domain").unwrap_err();
    assert!(matches!(err, VirtDocError::InvalidMagnitude { .. }));
}

#[test]
fn test_documented_scales() {
    let cases: [(&str, u128); 14] = [
        ("b", 1),
        ("bytes", 1),
        ("kb", 1_000),
        ("kib", 1 << 10),
        ("mb", 1_000_000),
        ("mib", 1 << 20),
        ("gb", 1_000_000_000),
        ("gib", 1 << 30),
        ("tb", 1_000_000_000_000),
        ("tib", 1 << 40),
        ("pb", 1_000_000_000_000_000),
        ("pib", 1 << 50),
        ("eb", 1_000_000_000_000_000_000),
        ("eib", 1 << 60),
    ];
    for (unit, scale) in cases {
        assert_eq!(to_bytes(1, unit).unwrap(), scale, "unit {}", unit);
    }
    for unit in ["x", "KxB", "KiX", "by"] {
        assert!(to_bytes(1, unit).is_err(), "unit {}", unit);
    }
}

#[test]
fn test_change_detector_on_encoded_definition() {
    let detector = ChangeDetector::default();
    let desired = network_definition();
    let observed = detector.encode_resource(ResourceKind::Network, &desired).unwrap();

    let report = detector.has_changed(ResourceKind::Network, &desired, &observed).unwrap();
    assert!(!report.changed);

    let drifted = observed.replace("192.168.122.11", "192.168.122.12");
    let report = detector.has_changed(ResourceKind::Network, &desired, &drifted).unwrap();
    assert!(report.changed);
    assert_eq!(report.path.as_deref(), Some("network.ip.dhcp.host.1._ip"));
    assert_eq!(
        report.cause.as_deref(),
        Some("values differ 192.168.122.11 != 192.168.122.12")
    );
}
