//! Live contract handles: ABI-driven calldata encoding and read-only calls.

use alloy_core::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::{Address, Bytes},
};

use crate::{
    DeployError,
    chain::{CallRequest, ChainClient},
};

/// Coerce CLI/config strings into ABI values for `params`.
fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>, DeployError> {
    if params.len() != args.len() {
        return Err(DeployError::Abi(format!(
            "expected {} argument(s), got {}",
            params.len(),
            args.len()
        )));
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .map_err(|e| DeployError::Abi(format!("unsupported type {}: {e}", param.ty)))?;
            ty.coerce_str(arg).map_err(|e| {
                DeployError::Abi(format!("cannot parse {arg:?} as {}: {e}", param.ty))
            })
        })
        .collect()
}

/// ABI-encode constructor arguments. An ABI without a constructor takes no arguments.
pub fn encode_constructor_args(abi: &JsonAbi, args: &[String]) -> Result<Bytes, DeployError> {
    match abi.constructor() {
        Some(constructor) => {
            let values = coerce_args(&constructor.inputs, args)?;
            constructor
                .abi_encode_input(&values)
                .map(Bytes::from)
                .map_err(|e| DeployError::Abi(format!("failed to encode constructor: {e}")))
        }
        None if args.is_empty() => Ok(Bytes::new()),
        None => Err(DeployError::Abi(format!(
            "contract has no constructor but {} argument(s) were given",
            args.len()
        ))),
    }
}

/// Render a decoded value for logs and CLI output.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        DynSolValue::String(s) => format!("{s:?}"),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => format!(
            "[{}]",
            items.iter().map(format_value).collect::<Vec<_>>().join(", ")
        ),
        DynSolValue::Tuple(items) => format!(
            "({})",
            items.iter().map(format_value).collect::<Vec<_>>().join(", ")
        ),
        other => format!("{other:?}"),
    }
}

/// A deployed contract: its address plus the ABI used to talk to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractHandle {
    pub address: Address,
    pub abi: JsonAbi,
}

impl ContractHandle {
    pub fn new(address: Address, abi: JsonAbi) -> Self {
        Self { address, abi }
    }

    /// Resolve `name` to the first overload taking `arg_count` arguments.
    pub fn function(&self, name: &str, arg_count: usize) -> Result<&Function, DeployError> {
        let overloads = self
            .abi
            .function(name)
            .ok_or_else(|| DeployError::Abi(format!("no function named `{name}` in ABI")))?;

        overloads
            .iter()
            .find(|f| f.inputs.len() == arg_count)
            .ok_or_else(|| {
                DeployError::Abi(format!(
                    "no overload of `{name}` takes {arg_count} argument(s); available: {}",
                    overloads
                        .iter()
                        .map(|f| f.signature())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    /// Selector-prefixed calldata for `name(args..)`.
    pub fn encode_call(&self, name: &str, args: &[String]) -> Result<Bytes, DeployError> {
        let function = self.function(name, args.len())?;
        let values = coerce_args(&function.inputs, args)?;

        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| DeployError::Abi(format!("failed to encode {}: {e}", function.signature())))
    }

    /// Decode the return data of `name` called with `arg_count` arguments.
    pub fn decode_output(
        &self,
        name: &str,
        arg_count: usize,
        data: &[u8],
    ) -> Result<Vec<DynSolValue>, DeployError> {
        let function = self.function(name, arg_count)?;

        function
            .abi_decode_output(data)
            .map_err(|e| DeployError::Abi(format!("failed to decode {}: {e}", function.signature())))
    }

    /// Simulate `name(args..)` against the latest state. Nothing is signed or broadcast.
    pub async fn call(
        &self,
        chain: &ChainClient,
        from: Option<Address>,
        name: &str,
        args: &[String],
    ) -> Result<Vec<DynSolValue>, DeployError> {
        let data = self.encode_call(name, args)?;

        let output = chain
            .call(&CallRequest {
                from,
                to: Some(self.address),
                data,
                value: None,
            })
            .await?;

        let values = self.decode_output(name, args.len(), &output)?;

        tracing::debug!(
            contract = %self.address,
            function = name,
            result = %values.iter().map(format_value).collect::<Vec<_>>().join(", "),
            "Call returned"
        );

        Ok(values)
    }
}
