use std::collections::HashMap;
use std::error::Error as _;
use std::time::Duration;

use rigid_yaml::{load, record, validate, BoxError, ErrorKind, Validate};

#[derive(Debug, PartialEq, thiserror::Error)]
enum ClusterError {
    #[error("weight must be positive")]
    ZeroWeight,
    #[error("primary {0:?} is not a node")]
    UnknownPrimary(String),
}

record! {
    #[derive(Debug, Default)]
    pub struct NodeSpec: Validate {
        pub name: String => { yaml = "name" },
        pub weight: u8 => { yaml = "weight" },
    }
}

impl Validate for NodeSpec {
    fn validate(&self) -> Result<(), BoxError> {
        if self.weight == 0 {
            return Err(Box::new(ClusterError::ZeroWeight));
        }
        Ok(())
    }
}

record! {
    #[derive(Debug, Default)]
    pub struct Cluster: Validate {
        pub primary: String => { yaml = "primary" },
        pub nodes: Vec<NodeSpec> => { yaml = "nodes" },
        pub pools: HashMap<String, NodeSpec> => { yaml = "pools" },
        pub standby: Option<NodeSpec> => { yaml = "standby" },
    }
}

impl Validate for Cluster {
    fn validate(&self) -> Result<(), BoxError> {
        if !self.nodes.iter().any(|node| node.name == self.primary) {
            return Err(Box::new(ClusterError::UnknownPrimary(self.primary.clone())));
        }
        Ok(())
    }
}

#[test]
fn valid_documents_pass_every_validator() {
    let mut cluster = Cluster::default();
    load("primary: a\nnodes:\n  - name: a\n    weight: 1\n", &mut cluster).unwrap();
    assert_eq!(cluster.nodes.len(), 1);
}

#[test]
fn root_validator_errors_carry_the_root_position() {
    let mut cluster = Cluster::default();
    let err = load("primary: z\nnodes:\n  - name: a\n    weight: 1\n", &mut cluster).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        err.to_string(),
        "at 1:1: at Cluster: validation: primary \"z\" is not a node"
    );
    let source = err.source().expect("source");
    assert_eq!(
        source.downcast_ref::<ClusterError>(),
        Some(&ClusterError::UnknownPrimary("z".to_string()))
    );
}

#[test]
fn sequence_item_errors_carry_index_and_position() {
    let input = "\
primary: a
nodes:
  - name: a
    weight: 1
  - name: b
    weight: 0
";
    let mut cluster = Cluster::default();
    let err = load(input, &mut cluster).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at 5:5: at Cluster.nodes[1]: validation: weight must be positive"
    );
}

#[test]
fn map_value_errors_carry_the_key() {
    let input = "\
primary: a
nodes:
  - name: a
    weight: 1
pools:
  gpu:
    name: g
    weight: 0
";
    let mut cluster = Cluster::default();
    let err = load(input, &mut cluster).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at 7:5: at Cluster.pools[gpu]: validation: weight must be positive"
    );
}

#[test]
fn absent_optional_values_are_not_validated() {
    let mut cluster = Cluster::default();
    load("primary: a\nnodes:\n  - name: a\n    weight: 1\nstandby: null\n", &mut cluster).unwrap();
    assert!(cluster.standby.is_none());

    let err = load(
        "primary: a\nnodes:\n  - name: a\n    weight: 1\nstandby:\n  name: s\n  weight: 0\n",
        &mut cluster,
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("at 6:3: at Cluster.standby: validation: "));
}

#[test]
fn in_memory_values_report_paths_only() {
    let cluster = Cluster {
        primary: "a".to_string(),
        nodes: vec![NodeSpec {
            name: "a".to_string(),
            weight: 0,
        }],
        ..Cluster::default()
    };
    let err = validate(&cluster).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at Cluster.nodes[0]: validation: weight must be positive"
    );
}

record! {
    #[derive(Debug, Default)]
    pub struct Limits {
        pub burst: u32 => { yaml = "burst", validate = "lte=100" },
    }
}

record! {
    #[derive(Debug, Default)]
    pub struct Service {
        pub name: String => { yaml = "name", validate = "required" },
        pub mode: String => { yaml = "mode", validate = "omitempty,oneof=fast slow" },
        pub timeout: Duration => { yaml = "timeout", validate = "omitempty,gte=1s,lte=1m" },
        pub limits: Option<Limits> => { yaml = "limits" },
        pub token: String => { yaml = "-", validate = "required" },
    }
}

#[test]
fn rule_violations_point_at_the_offending_value() {
    let mut service = Service {
        token: "t".to_string(),
        ..Service::default()
    };
    let err = load("name: api\nlimits:\n  burst: 500\n", &mut service).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRule);
    assert_eq!(
        err.to_string(),
        "at 3:10: \"burst\" violates validation rule: \"lte\""
    );

    let err = load("name: api\nmode: medium\n", &mut service).unwrap_err();
    assert_eq!(err.to_string(), "at 2:7: \"mode\" violates validation rule: \"oneof\"");

    let err = load("name: api\nmode: fast\ntimeout: 2m\n", &mut service).unwrap_err();
    assert_eq!(err.to_string(), "at 3:10: \"timeout\" violates validation rule: \"lte\"");
}

#[test]
fn missing_keys_report_the_enclosing_mapping() {
    let mut service = Service {
        token: "t".to_string(),
        ..Service::default()
    };
    let err = load("mode: fast\n", &mut service).unwrap_err();
    assert_eq!(err.to_string(), "at 1:1: \"name\" violates validation rule: \"required\"");
}

#[test]
fn ignored_fields_report_the_namespace() {
    let mut service = Service::default();
    let err = load("name: api\n", &mut service).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at Service.token: violates validation rule: \"required\""
    );
}

#[test]
fn in_memory_rule_violations_report_the_namespace() {
    let service = Service {
        name: "api".to_string(),
        token: "t".to_string(),
        limits: Some(Limits { burst: 101 }),
        ..Service::default()
    };
    let err = validate(&service).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at Service.limits.burst: violates validation rule: \"lte\""
    );
}

#[test]
fn in_memory_validation_checks_the_type_first() {
    record! {
        #[derive(Debug, Default)]
        struct Counted {
            pub count: usize => { yaml = "count" },
        }
    }

    let err = validate(&Counted::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeUnsupported);
}

#[test]
fn in_memory_rules_run_before_custom_validators() {
    record! {
        #[derive(Debug, Default)]
        struct Gate: Validate {
            pub name: String => { yaml = "name", validate = "required" },
            pub weight: u8 => { yaml = "weight" },
        }
    }

    impl Validate for Gate {
        fn validate(&self) -> Result<(), BoxError> {
            if self.weight == 0 {
                return Err(Box::new(ClusterError::ZeroWeight));
            }
            Ok(())
        }
    }

    let err = validate(&Gate::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRule);
    assert_eq!(
        err.to_string(),
        "at Gate.name: violates validation rule: \"required\""
    );

    let gate = Gate {
        name: "g".to_string(),
        weight: 0,
    };
    assert_eq!(validate(&gate).unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn numeric_map_keys_find_their_position() {
    record! {
        #[derive(Debug, Default)]
        struct Shards {
            pub shards: HashMap<u16, NodeSpec> => { yaml = "shards" },
        }
    }

    let input = "\
shards:
  7:
    name: a
    weight: 1
  0x10:
    name: b
    weight: 0
";
    let mut shards = Shards::default();
    let err = load(input, &mut shards).unwrap_err();
    assert_eq!(
        err.to_string(),
        "at 6:5: at Shards.shards[16]: validation: weight must be positive"
    );
}
