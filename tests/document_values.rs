use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use rigid_yaml::{load, load_with, newtype, record, BoxError, ErrorKind, LoadOptions, TextDecode};

newtype! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Level(pub String): TextDecode;
}

impl TextDecode for Level {
    fn decode_text(&mut self, text: &str) -> Result<(), BoxError> {
        match text {
            "debug" | "info" | "warn" => {
                self.0 = text.to_string();
                Ok(())
            }
            other => Err(format!("unknown level {other:?}").into()),
        }
    }
}

record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Server {
        pub host: String => { yaml = "host" },
        pub port: u16 => { yaml = "port" },
    }
}

record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Common {
        pub id: String => { yaml = "id" },
    }
}

record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Config {
        pub name: String => { yaml = "name" },
        pub enabled: bool => { yaml = "enabled" },
        pub ratio: f64 => { yaml = "ratio" },
        pub timeout: Duration => { yaml = "timeout" },
        pub level: Level => { yaml = "level" },
        pub root: PathBuf => { yaml = "root" },
        pub servers: Vec<Server> => { yaml = "servers" },
        pub pair: [i32; 2] => { yaml = "pair" },
        pub limits: BTreeMap<String, u32> => { yaml = "limits" },
        pub backup: Option<Server> => { yaml = "backup" },
        pub retries: Option<u8> => { yaml = "retries" },
        pub note: String => { yaml = "-" },
        pub common: Common => { yaml = ",inline", embedded },
    }
}

const FULL: &str = "\
name: api
enabled: true
ratio: 0.25
timeout: 1m30s
level: info
root: /srv/app
servers:
  - host: a.local
    port: 80
  - host: b.local
    port: 0x1F90
pair: [-1, 2]
limits:
  cpu: 2
  mem: 512
backup:
  host: c.local
  port: 8443
retries: null
id: primary
";

#[test]
fn decodes_every_supported_kind() {
    let mut config = Config::default();
    load(FULL, &mut config).unwrap();

    assert_eq!(config.name, "api");
    assert!(config.enabled);
    assert_eq!(config.ratio, 0.25);
    assert_eq!(config.timeout, Duration::from_secs(90));
    assert_eq!(config.level, Level("info".to_string()));
    assert_eq!(config.root, PathBuf::from("/srv/app"));
    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.servers[1].port, 8080);
    assert_eq!(config.pair, [-1, 2]);
    assert_eq!(config.limits.get("mem"), Some(&512));
    assert_eq!(config.backup.as_ref().map(|s| s.port), Some(8443));
    assert_eq!(config.retries, None);
    assert_eq!(config.common.id, "primary");
}

#[test]
fn missing_fields_keep_existing_values() {
    let mut config = Config {
        name: "preset".to_string(),
        note: "kept".to_string(),
        ..Config::default()
    };
    load("enabled: false\n", &mut config).unwrap();
    assert_eq!(config.name, "preset");
    assert_eq!(config.note, "kept");
}

#[test]
fn aliases_decode_the_anchored_value() {
    record! {
        #[derive(Debug, Default)]
        struct Ports {
            pub http: u16 => { yaml = "http" },
            pub admin: u16 => { yaml = "admin" },
        }
    }

    let mut ports = Ports::default();
    load("http: &port 8080\nadmin: *port\n", &mut ports).unwrap();
    assert_eq!(ports.admin, 8080);
}

#[test]
fn non_canonical_booleans_are_rejected() {
    let mut config = Config::default();
    let err = load("enabled: yes\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlBadBoolLiteral);
    assert_eq!(
        err.to_string(),
        "at 1:10: \"enabled\" (Config.enabled): must be either false or true, \
         other variants of boolean literals of YAML are not supported"
    );
}

#[test]
fn null_requires_a_nullable_target() {
    let mut config = Config::default();
    let err = load("name: null\n", &mut config).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at 1:7: \"name\" (Config.name): cannot assign null to non-nullable type"
    );

    config.servers = vec![Server::default()];
    load("servers: null\n", &mut config).unwrap();
    assert!(config.servers.is_empty());
}

#[test]
fn only_the_null_literal_is_accepted() {
    let mut config = Config::default();
    for literal in ["~", "Null", "NULL"] {
        let err = load(format!("retries: {literal}\n"), &mut config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::YamlBadNullLiteral, "literal {literal}");
    }
}

#[test]
fn tags_are_rejected() {
    let mut config = Config::default();
    let err = load("name: !!str api\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlTagUsed);
    assert_eq!(
        err.to_string(),
        "at 1:7: \"name\" (Config.name): tag \"!!str\": avoid using YAML tags"
    );
}

#[test]
fn merge_keys_are_rejected() {
    record! {
        #[derive(Debug, Default)]
        struct Pair {
            pub base: HashMap<String, String> => { yaml = "base" },
            pub derived: HashMap<String, String> => { yaml = "derived" },
        }
    }

    let mut pair = Pair::default();
    let err = load("base: &b\n  x: y\nderived:\n  <<: *b\n", &mut pair).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMergeKey);
    assert_eq!(err.to_string(), "at 4:3: avoid using YAML merge keys");
}

#[test]
fn anchors_must_be_unique_used_and_valued() {
    record! {
        #[derive(Debug, Default)]
        struct Names {
            pub a: String => { yaml = "a" },
            pub b: String => { yaml = "b" },
            pub c: String => { yaml = "c" },
        }
    }

    let mut names = Names::default();
    let err = load("a: &x one\nb: &x two\nc: *x\n", &mut names).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlAnchorRedefined);
    assert!(err.to_string().starts_with("at 2:4: redefined anchor \"x\" at 1:4"));

    let err = load("a: &x one\nb: two\n", &mut names).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlAnchorUnused);

    let err = load("a: &x\nb: *x\n", &mut names).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlAnchorNoValue);
}

#[test]
fn empty_sequence_items_are_rejected() {
    let mut config = Config::default();
    let err = load("servers:\n  - host: a\n  -\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlEmptyArrayItem);
    assert!(err.to_string().starts_with("at 3:4: \"servers\" (Config.servers): "));
}

#[test]
fn empty_fixed_array_items_are_rejected() {
    let mut config = Config::default();
    let err = load("pair:\n  - 1\n  -\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlEmptyArrayItem);
    assert!(err.to_string().starts_with("at 3:4: \"pair\" (Config.pair): "));
    assert_eq!(config.pair, [0, 0]);
}

#[test]
fn keys_equal_after_decoding_are_duplicates() {
    record! {
        #[derive(Debug, Default)]
        struct Labels {
            pub ids: HashMap<u8, String> => { yaml = "ids" },
        }
    }

    let mut labels = Labels::default();
    let err = load("ids:\n  1: a\n  01: b\n", &mut labels).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMalformed);
    assert!(err.to_string().starts_with("malformed YAML: at 3:3: "));
    assert!(err.to_string().contains("mapping key \"01\" already defined"));

    load("ids:\n  1: a\n  2: b\n", &mut labels).unwrap();
    assert_eq!(labels.ids.len(), 2);
}

#[test]
fn loading_twice_matches_a_single_load() {
    let mut once = Config::default();
    load(FULL, &mut once).unwrap();

    let mut twice = Config::default();
    load(FULL, &mut twice).unwrap();
    load(FULL, &mut twice).unwrap();
    assert_eq!(twice, once);
    assert_eq!(twice.servers.len(), 2);
    assert_eq!(twice.limits.len(), 2);
}

#[test]
fn text_decoders_require_scalars() {
    let mut config = Config::default();
    let err = load("level:\n  name: info\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlNonStrOnTextDecoder);

    let err = load("level: trace\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMalformed);
    assert!(err.to_string().contains("unknown level \"trace\""));
}

#[test]
fn unknown_keys_are_rejected() {
    let mut config = Config::default();
    let err = load("name: api\nextra: 1\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMalformed);
    assert_eq!(
        err.to_string(),
        "malformed YAML: at 2:1: field \"extra\" not found in type Config"
    );

    let err = load("note: hidden\n", &mut config).unwrap_err();
    assert!(err.to_string().contains("field \"note\" not found in type Config"));
}

#[test]
fn numbers_must_fit_and_must_not_be_quoted() {
    let mut config = Config::default();
    let err = load("servers:\n  - port: 70000\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMalformed);
    assert!(err.to_string().contains("Config.servers[0].port"));

    let err = load("servers:\n  - port: \"80\"\n", &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMalformed);
}

#[test]
fn fixed_arrays_require_exact_length() {
    let mut config = Config::default();
    let err = load("pair: [1, 2, 3]\n", &mut config).unwrap_err();
    assert!(err.to_string().contains("invalid array: want 2 elements but got 3"));
}

#[test]
fn strict_presence_reports_missing_fields() {
    let mut server = Server::default();
    let options = LoadOptions::new().strict_presence(true);
    let err = load_with("host: a\n", &mut server, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMissingField);
    assert_eq!(
        err.to_string(),
        "at Server.port (as \"port\"): missing field in config file"
    );

    load_with("host: a\nport: 1\n", &mut server, &options).unwrap();
    assert_eq!(server.port, 1);
}

#[test]
fn empty_and_multi_document_sources_are_rejected() {
    let mut server = Server::default();
    assert_eq!(load("", &mut server).unwrap_err().kind(), ErrorKind::YamlEmptyFile);
    assert_eq!(
        load("# nothing\n", &mut server).unwrap_err().kind(),
        ErrorKind::YamlEmptyFile
    );
    assert_eq!(
        load("host: a\n---\nhost: b\n", &mut server).unwrap_err().kind(),
        ErrorKind::YamlMultidoc
    );
}

#[test]
fn invalid_utf8_is_malformed() {
    let mut server = Server::default();
    let err = load(b"host: \xff\n", &mut server).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::YamlMalformed);
    assert_eq!(err.to_string(), "malformed YAML: at 1:7: invalid UTF-8");
}
