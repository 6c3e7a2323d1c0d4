use crate::{
    networks::evm::{EvmAddress, EvmNetwork},
    transport::PaymentRequirements,
};

/// Pick the requirements to pay from a 402 `accepts` list.
///
/// `base` entries are tried first. Among entries matching `network` and `scheme` (each
/// ignored when `None`), one priced in the network's default USDC wins, then the first
/// match. With no match at all the first entry is returned.
pub fn select_payment_requirements<'a>(
    accepts: &'a [PaymentRequirements],
    network: Option<&str>,
    scheme: Option<&str>,
) -> Option<&'a PaymentRequirements> {
    let mut ordered: Vec<&PaymentRequirements> = accepts.iter().collect();
    ordered.sort_by_key(|r| r.network != "base");

    let accepted: Vec<&PaymentRequirements> = ordered
        .iter()
        .copied()
        .filter(|r| scheme.is_none_or(|s| r.scheme == s))
        .filter(|r| network.is_none_or(|n| r.network == n))
        .collect();

    accepted
        .iter()
        .copied()
        .find(|r| is_default_usdc(r))
        .or_else(|| accepted.first().copied())
        .or_else(|| ordered.first().copied())
}

fn is_default_usdc(requirements: &PaymentRequirements) -> bool {
    let Some(usdc) = EvmNetwork::by_name(&requirements.network).and_then(|n| n.default_asset())
    else {
        return false;
    };
    requirements
        .asset
        .parse::<EvmAddress>()
        .is_ok_and(|asset| asset == usdc.address)
}
