use std::path::PathBuf;

use ipsec_flatfile::{parse_conf_file, parse_secrets_file};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn parses_sections_and_parameters() {
    let doc = parse_conf_file(&fixture("fixtures/ipsec.conf")).expect("parse should succeed");

    let headers: Vec<&str> = doc.sections.iter().map(|s| s.header.as_str()).collect();
    assert_eq!(
        headers,
        vec![
            "config setup",
            "conn %default",
            "conn l2tp",
            "conn ikev1",
            "conn windows",
            "conn gw_psk0",
            "conn gw_cert1",
            "conn gw_mobile2",
            "conn gw_win3",
            "conn client_psk4",
            "conn client_cert5",
        ]
    );

    let setup = doc.get_section("config setup").expect("config setup");
    assert_eq!(setup.get("charondebug"), Some("ike 1, knl 1"));

    let gw = doc.get_section("conn gw_psk0").expect("gw_psk0");
    assert_eq!(gw.name(), "gw_psk0");
    assert_eq!(gw.params.len(), 12);
    assert_eq!(gw.get("leftsubnet"), Some("192.168.82.0/24"));

    assert_eq!(doc.sections_of_kind("conn").len(), 10);
}

#[test]
fn parses_secret_entries_including_ipv6_selectors() {
    let doc = parse_secrets_file(&fixture("fixtures/ipsec.secrets")).expect("parse should succeed");

    assert_eq!(doc.entries.len(), 19);
    assert_eq!(doc.entries[0].selectors, "");
    assert_eq!(doc.entries[0].value, "PSK \"aaa\"");

    let v6 = &doc.entries[5];
    assert_eq!(v6.selectors, "2620:113:80c0:8080:9a90:96ff:fea9:c584");
    assert_eq!(v6.kind(), "PSK");
    assert_eq!(v6.payload(), "\"ipv6\"");

    let multi = &doc.entries[4];
    assert_eq!(multi.selectors, "%any 25.52.34.34");

    let pin = doc.entries.last().expect("last entry");
    assert_eq!(pin.selectors, "def");
    assert_eq!(pin.kind(), "PIN");
}
