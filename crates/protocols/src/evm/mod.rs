//! EVM contract-call adapters.
//!
//! Calldata is encoded through `alloy::sol!` bindings. Amounts cross this
//! boundary as `primitive_types::U256` and are converted here.

/// 1inch aggregator.
pub mod oneinch;
/// Uniswap V3 style nonfungible position manager.
pub mod position_manager;

use crate::error::AdapterError;
use alloy::primitives::{Address, U256 as AlloyU256};
use alloy::sol_types::SolCall;
use primitive_types::U256;
use std::str::FromStr;

alloy::sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool success);
        function allowance(address owner, address spender)
            external
            view
            returns (uint256 remaining);
        function balanceOf(address owner) external view returns (uint256 balance);
    }
}

/// Parses a `0x`-prefixed 20-byte address.
pub fn parse_address(s: &str) -> Result<Address, AdapterError> {
    Address::from_str(s)
        .map_err(|e| AdapterError::InvalidInput(format!("invalid address {s}: {e}")))
}

/// Converts to alloy's `U256`.
#[must_use]
pub fn to_alloy(value: U256) -> AlloyU256 {
    AlloyU256::from_be_bytes(value.to_big_endian())
}

/// Converts from alloy's `U256`.
#[must_use]
pub fn from_alloy(value: AlloyU256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

/// Calldata for `approve(spender, amount)`.
pub fn approve_calldata(spender: &str, amount: U256) -> Result<Vec<u8>, AdapterError> {
    Ok(IERC20::approveCall {
        spender: parse_address(spender)?,
        amount: to_alloy(amount),
    }
    .abi_encode())
}

/// Calldata for `balanceOf(owner)`.
pub fn balance_of_calldata(owner: &str) -> Result<Vec<u8>, AdapterError> {
    Ok(IERC20::balanceOfCall {
        owner: parse_address(owner)?,
    }
    .abi_encode())
}

/// Decodes the return data of `balanceOf`.
pub fn decode_balance_of(data: &[u8]) -> Result<U256, AdapterError> {
    let decoded = IERC20::balanceOfCall::abi_decode_returns(data, true)
        .map_err(|e| AdapterError::Decode(format!("balanceOf: {e}")))?;
    Ok(from_alloy(decoded.balance))
}

pub(crate) fn decode_error(what: &str, err: alloy::sol_types::Error) -> AdapterError {
    AdapterError::Decode(format!("{what}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANAGER: &str = "0xC36442b4a4522E871399CD717aBDD847Ab11FE88";

    #[test]
    fn test_approve_calldata() {
        let data = approve_calldata(MANAGER, U256::from(1_000u64)).unwrap();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &IERC20::approveCall::SELECTOR);
        let call = IERC20::approveCall::abi_decode(&data, true).unwrap();
        assert_eq!(call.spender, parse_address(MANAGER).unwrap());
        assert_eq!(from_alloy(call.amount), U256::from(1_000u64));
    }

    #[test]
    fn test_balance_of_round_trip() {
        let data = balance_of_calldata(MANAGER).unwrap();
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        let ret = AlloyU256::from(123_456u64).to_be_bytes::<32>();
        assert_eq!(decode_balance_of(&ret).unwrap(), U256::from(123_456u64));
        assert!(decode_balance_of(&ret[..8]).is_err());
    }

    #[test]
    fn test_u256_conversion() {
        let value = U256::from(u128::MAX) * U256::from(3u8);
        assert_eq!(from_alloy(to_alloy(value)), value);
    }

    #[test]
    fn test_parse_address_rejects_short() {
        assert!(parse_address("0x1234").is_err());
    }
}
