use crate::error::DeployError;
use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;

/// Coerces raw string arguments against the ABI constructor and returns the
/// ABI-encoded parameters to append to the creation code.
pub fn encode_constructor_args(abi: &JsonAbi, raw_args: &[String]) -> Result<Bytes, DeployError> {
    let inputs = abi
        .constructor
        .as_ref()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();

    if inputs.len() != raw_args.len() {
        return Err(DeployError::InvalidConstructorArguments(format!(
            "constructor expects {} argument(s) ({}), got {}",
            inputs.len(),
            inputs
                .iter()
                .map(|p| p.selector_type().into_owned())
                .collect::<Vec<_>>()
                .join(", "),
            raw_args.len()
        )));
    }
    if inputs.is_empty() {
        return Ok(Bytes::new());
    }

    let mut values = Vec::with_capacity(inputs.len());
    for (i, (param, raw)) in inputs.iter().zip(raw_args).enumerate() {
        let type_name = param.selector_type();
        let ty = DynSolType::parse(&type_name).map_err(|e| {
            DeployError::InvalidConstructorArguments(format!(
                "unsupported type {} for argument {}: {}",
                type_name, i, e
            ))
        })?;
        let value = ty.coerce_str(raw).map_err(|e| {
            let name = if param.name.is_empty() {
                format!("#{}", i)
            } else {
                param.name.clone()
            };
            DeployError::InvalidConstructorArguments(format!(
                "argument {} ({}) = {:?}: {}",
                name, type_name, raw, e
            ))
        })?;
        values.push(value);
    }

    Ok(Bytes::from(DynSolValue::Tuple(values).abi_encode_params()))
}
