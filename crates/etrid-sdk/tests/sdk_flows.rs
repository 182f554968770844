//! Integration tests for the SDK wrappers over an in-memory chain
//!
//! These tests drive several wrappers through one shared client and check
//! the transaction protocol end to end: signed call shape, finality, event
//! decoding and dispatch-error reporting.

use etrid_client::mock::{MockChain, MockEvm};
use etrid_client::{ChainEvent, Client, DispatchError, ModuleErrorInfo, Signer};
use etrid_core::constants::ONE_ETR;
use etrid_core::EtridError;
use etrid_sdk::{Chain, ChannelStatus, EtridSdk};
use serde_json::json;
use std::sync::Arc;

const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

fn sdk() -> (Arc<MockChain>, EtridSdk, Signer) {
    let chain = Arc::new(MockChain::new());
    let sdk = EtridSdk::new(Client::new(chain.clone()));
    (chain, sdk, Signer::from_seed([7u8; 32]))
}

mod channel_tests {
    use super::*;

    #[tokio::test]
    async fn test_open_then_read_channel() {
        let (chain, sdk, signer) = sdk();
        chain.finalize_with(vec![ChainEvent::new(
            "lightningBloc",
            "ChannelOpened",
            vec![json!("0xc0ffee"), json!(signer.address()), json!(BOB)],
        )]);

        let id = sdk
            .channels
            .open_channel(&signer, BOB, 5 * ONE_ETR, 0, 1_000)
            .await
            .unwrap();
        assert_eq!(id, "0xc0ffee");

        let sent = chain.last_submitted().unwrap();
        assert_eq!(sent.call.label(), "lightningBloc.openChannel");
        assert_eq!(sent.signer, signer.address());
        assert_eq!(sent.call.args[1], json!((5 * ONE_ETR).to_string()));

        chain.set_storage(
            "lightningBloc",
            "channels",
            vec![json!("0xc0ffee")],
            json!({
                "partyA": signer.address(),
                "partyB": BOB,
                "balanceA": (5 * ONE_ETR).to_string(),
                "balanceB": "0",
                "nonce": 0,
                "expiresAt": 1_500,
            }),
        );
        let channel = sdk.channels.get_channel(&id).await.unwrap();
        assert_eq!(channel.id, "0xc0ffee");
        assert_eq!(channel.status, ChannelStatus::Open);
        assert_eq!(channel.capacity(), 5 * ONE_ETR);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let (_, sdk, _) = sdk();
        let err = sdk.channels.get_channel("0xdead").await.unwrap_err();
        assert!(err.is_not_found());
    }
}

mod transaction_protocol_tests {
    use super::*;

    #[tokio::test]
    async fn test_module_error_reaches_caller() {
        let (chain, sdk, signer) = sdk();
        chain.register_module_error(
            12,
            3,
            ModuleErrorInfo {
                section: "xcmBridge".into(),
                name: "DailyLimitExceeded".into(),
                docs: vec!["Daily bridge limit exceeded".into()],
            },
        );
        chain.fail_with(DispatchError::Module { index: 12, error: 3 });

        let err = sdk
            .bridge
            .bridge_tokens(&signer, Chain::ETH, Chain::BTC, ONE_ETR, "bc1qrecipient")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EtridError::Transaction(
                "xcmBridge.DailyLimitExceeded: Daily bridge limit exceeded".into()
            )
        );
        assert_eq!(err.category(), "transaction");
    }

    #[tokio::test]
    async fn test_missing_event_is_an_error() {
        let (chain, sdk, signer) = sdk();
        // finalizes without the BridgeInitiated event
        chain.finalize_with(vec![]);

        let err = sdk
            .bridge
            .bridge_tokens(&signer, Chain::SOL, Chain::ETH, ONE_ETR, "0xrecipient")
            .await
            .unwrap_err();
        assert_eq!(err, EtridError::MissingEvent("xcmBridge.BridgeInitiated".into()));
    }

    #[tokio::test]
    async fn test_validation_precedes_submission() {
        let (chain, sdk, signer) = sdk();
        assert!(sdk
            .bridge
            .bridge_tokens(&signer, Chain::ETH, Chain::ETH, ONE_ETR, "0xrecipient")
            .await
            .is_err());
        assert!(sdk
            .bridge
            .bridge_tokens(&signer, Chain::ETH, Chain::BTC, 0, "0xrecipient")
            .await
            .is_err());
        assert!(chain.submitted().is_empty());
    }
}

#[test]
fn test_precompiles_need_an_evm_endpoint() {
    let (_, sdk, _) = sdk();
    assert!(sdk.precompiles.is_none());
    let sdk = sdk.with_evm(Arc::new(MockEvm::new()));
    assert!(sdk.precompiles.is_some());
}
