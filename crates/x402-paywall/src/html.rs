//! The paywall page served to browsers hitting a priced route without paying.

use serde_json::json;
use x402_exact::{
    networks::evm::{EvmNetwork, NETWORKS},
    price::{Money, Price},
    transport::PaymentRequirements,
};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{{title}}</title>
</head>
<body>
  <div class="container">
    <div class="header">
      {{logo}}
      <h1 class="title">Payment Required</h1>
      <p class="subtitle" id="payment-description">{{description}}</p>
      {{instructions}}
    </div>
    <div class="content">
      <div id="connect-section">
        <button id="connect-wallet" class="button button-primary">Connect wallet</button>
      </div>
      <div id="payment-section" class="hidden">
        <div class="payment-details">
          <div class="payment-row">
            <span class="payment-label">Amount:</span>
            <span class="payment-value" id="payment-amount">{{amount}} USDC</span>
          </div>
          <div class="payment-row">
            <span class="payment-label">Network:</span>
            <span class="payment-value" id="payment-network">{{network}}</span>
          </div>
        </div>
        <button id="pay-button" class="button button-secondary">Pay Now</button>
      </div>
      <div id="status" class="status"></div>
    </div>
  </div>
</body>
</html>
"#;

/// What the paywall page shows and hands to its wallet script.
#[derive(Debug, Clone)]
pub struct PaywallPage<'a> {
    pub amount: String,
    pub requirements: &'a [PaymentRequirements],
    pub current_url: &'a str,
    pub testnet: bool,
    pub app_name: Option<&'a str>,
    pub app_logo: Option<&'a str>,
}

impl PaywallPage<'_> {
    pub fn render(&self) -> String {
        let selected = self.requirements.first();
        let description = selected
            .map(|r| r.description.as_str())
            .filter(|d| !d.is_empty())
            .unwrap_or("Access to this resource requires payment.");
        let network = selected.map(|r| r.network.as_str()).unwrap_or_default();
        let network_name = EvmNetwork::by_name(network)
            .map(|n| n.display_name)
            .unwrap_or(network);
        let instructions = if self.testnet {
            format!(
                r#"<p class="instructions" id="instructions">Need {} USDC? <a href="https://faucet.circle.com/" target="_blank" rel="noopener noreferrer">Get some here.</a></p>"#,
                escape_html(network_name)
            )
        } else {
            String::new()
        };
        let logo = self
            .app_logo
            .map(|src| format!(r#"<img class="logo" src="{}" alt="">"#, escape_html(src)))
            .unwrap_or_default();
        let title = match self.app_name {
            Some(name) => format!("{} - Payment Required", escape_html(name)),
            None => "Payment Required".to_string(),
        };

        TEMPLATE
            .replace("{{title}}", &title)
            .replace("{{logo}}", &logo)
            .replace("{{description}}", &escape_html(description))
            .replace("{{instructions}}", &instructions)
            .replace("{{amount}}", &escape_html(&self.amount))
            .replace("{{network}}", &escape_html(network))
            .replace("</head>", &format!("{}\n</head>", self.config_script()))
    }

    fn config_script(&self) -> String {
        let chain_config: serde_json::Map<String, serde_json::Value> = NETWORKS
            .iter()
            .filter_map(|network| {
                let asset = network.default_asset()?;
                Some((
                    network.chain_id.to_string(),
                    json!({
                        "usdcAddress": asset.address,
                        "usdcName": asset.eip712.name,
                    }),
                ))
            })
            .collect();
        let config = json!({
            "amount": self.amount,
            "paymentRequirements": self.requirements,
            "testnet": self.testnet,
            "currentUrl": self.current_url,
            "appName": self.app_name,
            "appLogo": self.app_logo,
            "config": { "chainConfig": chain_config },
        });
        // `</script>` inside a string literal would end the script element.
        let config = config.to_string().replace('<', "\\u003c");
        format!("<script>\n  window.x402 = {config};\n</script>")
    }
}

/// Human-readable amount for a route price.
pub fn display_amount(price: &Price) -> String {
    match price {
        Price::Money(raw) => Money::parse(raw)
            .map(|money| money.to_string())
            .unwrap_or_else(|_| raw.clone()),
        Price::TokenAmount(token) => {
            format_units(&token.amount.to_string(), token.asset.decimals)
        }
    }
}

fn format_units(atomic: &str, decimals: u8) -> String {
    let decimals = decimals as usize;
    if decimals == 0 {
        return atomic.to_string();
    }
    let padded = format!("{atomic:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use x402_exact::{
        networks::evm::{USDC_AVALANCHE_FUJI, USDC_BASE_SEPOLIA},
        price::{AssetInfo, TokenAmount},
    };

    use super::*;

    #[test]
    fn test_display_amount() {
        assert_eq!(display_amount(&"$0.010".into()), "0.01");
        assert_eq!(display_amount(&"nonsense".into()), "nonsense");
        let token = TokenAmount {
            amount: 1_500_000u32.into(),
            asset: AssetInfo::from(USDC_BASE_SEPOLIA),
        };
        assert_eq!(display_amount(&token.into()), "1.5");
        assert_eq!(format_units("42", 6), "0.000042");
        assert_eq!(format_units("42", 0), "42");
    }

    #[test]
    fn test_render_injects_config() {
        let html = PaywallPage {
            amount: "0.01".to_string(),
            requirements: &[],
            current_url: "https://example.com/weather?q=</script>",
            testnet: true,
            app_name: Some("<Weather>"),
            app_logo: None,
        }
        .render();

        assert!(html.contains("window.x402 = "));
        assert!(html.contains("\"testnet\":true"));
        assert!(html.contains("&lt;Weather&gt; - Payment Required"));
        assert!(html.contains("faucet.circle.com"));
        assert!(!html.contains("q=</script>"));
        assert!(html.contains("\"84532\""));
    }

    #[test]
    fn test_faucet_hint_names_the_network() {
        let requirements: PaymentRequirements = serde_json::from_value(json!({
            "scheme": "exact",
            "network": "avalanche-fuji",
            "maxAmountRequired": "10000",
            "resource": "https://example.com/weather",
            "description": "",
            "mimeType": "application/json",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "maxTimeoutSeconds": 300,
            "asset": USDC_AVALANCHE_FUJI.address.to_string(),
        }))
        .unwrap();
        let page = PaywallPage {
            amount: "0.01".to_string(),
            requirements: std::slice::from_ref(&requirements),
            current_url: "https://example.com/weather",
            testnet: true,
            app_name: None,
            app_logo: None,
        };

        let html = page.render();
        assert!(html.contains("Need Avalanche Fuji USDC?"));
        assert!(!html.contains("Base Sepolia"));

        let html = PaywallPage {
            testnet: false,
            ..page
        }
        .render();
        assert!(!html.contains("faucet.circle.com"));
    }
}
