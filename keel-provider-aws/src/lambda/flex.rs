//! Flattening of Lambda API structures into attribute values

use std::collections::HashMap;

use aws_sdk_lambda::types::{Layer, VpcConfigResponse};
use keel_core::resource::Value;

/// Layer ARNs, in the order the function lists them
pub fn flatten_layers(layers: &[Layer]) -> Value {
    Value::List(
        layers
            .iter()
            .map(|layer| Value::String(layer.arn().unwrap_or_default().to_string()))
            .collect(),
    )
}

/// VPC configuration as a list of at most one block
///
/// A function outside any VPC reports a configuration whose subnets,
/// security groups and VPC ID are all empty; that flattens to an empty list.
pub fn flatten_vpc_config_response(vpc: Option<&VpcConfigResponse>) -> Value {
    let Some(vpc) = vpc else {
        return Value::List(Vec::new());
    };

    let subnet_ids = vpc.subnet_ids();
    let security_group_ids = vpc.security_group_ids();
    if subnet_ids.is_empty()
        && security_group_ids.is_empty()
        && vpc.vpc_id().unwrap_or_default().is_empty()
    {
        return Value::List(Vec::new());
    }

    let strings = |items: &[String]| Value::List(items.iter().cloned().map(Value::String).collect());

    let mut block = HashMap::from([
        ("subnet_ids".to_string(), strings(subnet_ids)),
        ("security_group_ids".to_string(), strings(security_group_ids)),
        (
            "ipv6_allowed_for_dual_stack".to_string(),
            Value::Bool(vpc.ipv6_allowed_for_dual_stack().unwrap_or_default()),
        ),
    ]);
    if let Some(vpc_id) = vpc.vpc_id() {
        block.insert("vpc_id".to_string(), Value::String(vpc_id.to_string()));
    }

    Value::List(vec![Value::Map(block)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(arn: &str) -> Layer {
        Layer::builder().arn(arn).build()
    }

    #[test]
    fn layers_keep_order_and_only_arns() {
        let layers = [
            Layer::builder()
                .arn("arn:aws:lambda:us-east-1:123456789012:layer:b:2")
                .code_size(1024)
                .build(),
            layer("arn:aws:lambda:us-east-1:123456789012:layer:a:1"),
        ];

        assert_eq!(
            flatten_layers(&layers),
            Value::List(vec![
                Value::from("arn:aws:lambda:us-east-1:123456789012:layer:b:2"),
                Value::from("arn:aws:lambda:us-east-1:123456789012:layer:a:1"),
            ])
        );
    }

    #[test]
    fn no_layers_flatten_to_empty_list() {
        assert_eq!(flatten_layers(&[]), Value::List(vec![]));
    }

    #[test]
    fn absent_vpc_config_is_empty() {
        assert_eq!(flatten_vpc_config_response(None), Value::List(vec![]));
    }

    #[test]
    fn all_empty_vpc_config_is_empty() {
        let vpc = VpcConfigResponse::builder()
            .vpc_id("")
            .ipv6_allowed_for_dual_stack(false)
            .build();
        assert_eq!(flatten_vpc_config_response(Some(&vpc)), Value::List(vec![]));

        let vpc = VpcConfigResponse::builder().build();
        assert_eq!(flatten_vpc_config_response(Some(&vpc)), Value::List(vec![]));
    }

    #[test]
    fn vpc_config_with_any_field_is_one_block() {
        let vpc = VpcConfigResponse::builder()
            .subnet_ids("subnet-1")
            .subnet_ids("subnet-2")
            .security_group_ids("sg-1")
            .vpc_id("vpc-1")
            .ipv6_allowed_for_dual_stack(true)
            .build();

        let expected = Value::List(vec![Value::Map(HashMap::from([
            (
                "subnet_ids".to_string(),
                Value::List(vec![Value::from("subnet-1"), Value::from("subnet-2")]),
            ),
            (
                "security_group_ids".to_string(),
                Value::List(vec![Value::from("sg-1")]),
            ),
            ("ipv6_allowed_for_dual_stack".to_string(), Value::Bool(true)),
            ("vpc_id".to_string(), Value::from("vpc-1")),
        ]))]);
        assert_eq!(flatten_vpc_config_response(Some(&vpc)), expected);
    }

    #[test]
    fn vpc_id_is_omitted_when_absent() {
        let vpc = VpcConfigResponse::builder().subnet_ids("subnet-1").build();

        let Value::List(blocks) = flatten_vpc_config_response(Some(&vpc)) else {
            panic!("expected a list");
        };
        assert_eq!(blocks.len(), 1);
        let block = blocks[0].as_map().unwrap();
        assert!(!block.contains_key("vpc_id"));
        assert_eq!(block["security_group_ids"], Value::List(vec![]));
        assert_eq!(block["ipv6_allowed_for_dual_stack"], Value::Bool(false));
    }
}
