use std::{path::Path, sync::Arc, time::Duration};

use alloy_primitives::address;
use pretty_assertions::assert_eq;
use rstest::rstest;
use test_log::test;
use tycho_liquidity::{
    sandbox::{SandboxChain, TokenBehaviour},
    scenario::{Scenario, StepOutcome},
    Collaborators, CustodyFailure, Funding, OrchestratorConfig, OrchestratorError,
    PositionOrchestrator, SlippageViolation,
};
use tycho_liquidity_common::{
    models::{CallContext, Chain, FeeTier, IncreaseRequest, PositionRequest},
    traits::{FungibleAsset, NativeCurrency, PositionManager, WrappedNativeAsset},
    units::parse_units,
    Address, U256,
};

const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
const WBTC: Address = address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599");
const ALICE: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const BOB: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const WETH_USDC_TICK: i32 = 192600;
const LOWER: i32 = 170040;
const UPPER: i32 = 200040;

fn weth() -> Address {
    Chain::Ethereum.wrapped_native()
}

fn usdc(amount: &str) -> U256 {
    parse_units(amount, 6).unwrap()
}

fn ether(amount: &str) -> U256 {
    parse_units(amount, 18).unwrap()
}

struct Fixture {
    sandbox: SandboxChain,
    orchestrator: PositionOrchestrator,
}

impl Fixture {
    /// Mainnet-like chain with USDC/WETH, USDC/USDT and WBTC/USDC pools, and two funded users.
    fn new() -> Self {
        let sandbox = SandboxChain::for_chain(Chain::Ethereum, GENESIS_TIMESTAMP).unwrap();
        sandbox.register_token(USDC, "USDC", 6).unwrap();
        sandbox.register_token(USDT, "USDT", 6).unwrap();
        sandbox.register_token(WBTC, "WBTC", 8).unwrap();
        sandbox
            .create_pool(USDC, weth(), FeeTier::MEDIUM, WETH_USDC_TICK)
            .unwrap();
        sandbox
            .create_pool(USDC, USDT, FeeTier::LOWEST, -20)
            .unwrap();
        sandbox
            .create_pool(WBTC, USDC, FeeTier::MEDIUM, 65000)
            .unwrap();
        for user in [ALICE, BOB] {
            sandbox
                .set_native_balance(user, ether("100"))
                .unwrap();
            sandbox
                .mint_tokens(USDC, user, usdc("10000"))
                .unwrap();
        }

        let address = sandbox.deploy_address(ALICE).unwrap();
        let config = OrchestratorConfig::for_chain(Chain::Ethereum).unwrap();
        let orchestrator =
            PositionOrchestrator::new(address, config, Collaborators::from_chain(sandbox.clone()));
        Self { sandbox, orchestrator }
    }

    async fn wrap(&self, user: Address, amount: U256) {
        self.sandbox
            .deposit(user, amount)
            .await
            .unwrap();
    }

    async fn approve(&self, user: Address, token: Address, amount: U256) {
        assert!(self
            .sandbox
            .approve(token, user, self.orchestrator.address(), amount)
            .await
            .unwrap());
    }

    async fn balance(&self, token: Address, owner: Address) -> U256 {
        self.sandbox
            .balance_of(token, owner)
            .await
            .unwrap()
    }

    async fn native(&self, owner: Address) -> U256 {
        self.sandbox
            .native_balance(owner)
            .await
            .unwrap()
    }

    /// Asserts the orchestrator holds nothing and left no allowance to the position manager.
    async fn assert_no_residue(&self, tokens: &[Address]) {
        let orchestrator = self.orchestrator.address();
        let position_manager = self.orchestrator.config().position_manager;
        for token in tokens {
            assert_eq!(self.balance(*token, orchestrator).await, U256::ZERO);
            assert_eq!(
                self.sandbox
                    .allowance(*token, orchestrator, position_manager)
                    .await
                    .unwrap(),
                U256::ZERO
            );
        }
        assert_eq!(self.native(orchestrator).await, U256::ZERO);
    }
}

fn weth_usdc_request(amount_weth: U256, amount_usdc: U256, slippage: u32) -> PositionRequest {
    PositionRequest {
        token0: weth(),
        token1: USDC,
        amount0: amount_weth,
        amount1: amount_usdc,
        fee_tier: FeeTier::MEDIUM,
        tick_lower: LOWER,
        tick_upper: UPPER,
        slippage,
    }
}

#[test(tokio::test)]
async fn test_open_and_increase_position() {
    let fixture = Fixture::new();
    fixture.wrap(ALICE, ether("1")).await;
    fixture
        .approve(ALICE, weth(), ether("0.5"))
        .await;
    fixture
        .approve(ALICE, USDC, usdc("1000"))
        .await;

    let receipt = fixture
        .orchestrator
        .new_position(CallContext::new(ALICE), weth_usdc_request(ether("0.5"), usdc("1000"), 10))
        .await
        .unwrap();

    let weth_leg = receipt.leg_for(weth()).unwrap();
    let usdc_leg = receipt.leg_for(USDC).unwrap();
    assert_eq!(receipt.pair.token0, USDC);
    assert_eq!(weth_leg.used, ether("0.5"));
    assert!(usdc_leg.used >= usdc("900") && usdc_leg.used <= usdc("1000"));
    assert_eq!(usdc_leg.refunded, usdc("1000") - usdc_leg.used);
    assert_eq!(fixture.balance(USDC, ALICE).await, usdc("10000") - usdc_leg.used);
    assert_eq!(fixture.balance(weth(), ALICE).await, ether("0.5"));

    let info = fixture
        .sandbox
        .positions(receipt.position_id)
        .await
        .unwrap();
    assert!(info.liquidity > 0);
    assert_eq!(info.liquidity, receipt.liquidity);
    assert_eq!(
        fixture
            .sandbox
            .owner_of(receipt.position_id)
            .await
            .unwrap(),
        ALICE
    );
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;

    fixture
        .approve(ALICE, weth(), ether("0.1"))
        .await;
    fixture
        .approve(ALICE, USDC, usdc("200"))
        .await;
    let increase = fixture
        .orchestrator
        .increase_liquidity(
            CallContext::new(ALICE),
            IncreaseRequest::new(
                receipt.position_id,
                weth_usdc_request(ether("0.1"), usdc("200"), 10),
            ),
        )
        .await
        .unwrap();

    let info = fixture
        .sandbox
        .positions(receipt.position_id)
        .await
        .unwrap();
    assert!(increase.liquidity_delta > 0);
    assert_eq!(info.liquidity, receipt.liquidity + increase.liquidity_delta);
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;
}

#[rstest]
#[case::only_usdc(USDC, usdc("1000"), weth())]
#[case::only_weth(weth(), ether("0.5"), USDC)]
#[tokio::test]
async fn test_one_leg_approved_leaves_balances_unchanged(
    #[case] approved: Address,
    #[case] allowance: U256,
    #[case] missing: Address,
) {
    let fixture = Fixture::new();
    fixture.wrap(ALICE, ether("1")).await;
    fixture
        .approve(ALICE, approved, allowance)
        .await;

    let err = fixture
        .orchestrator
        .new_position(CallContext::new(ALICE), weth_usdc_request(ether("0.5"), usdc("1000"), 10))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Custody {
            token,
            reason: CustodyFailure::InsufficientAllowance { .. },
            ..
        } if token == missing
    ));
    assert_eq!(fixture.balance(USDC, ALICE).await, usdc("10000"));
    assert_eq!(fixture.balance(weth(), ALICE).await, ether("1"));
    assert_eq!(
        fixture
            .sandbox
            .allowance(approved, ALICE, fixture.orchestrator.address())
            .await
            .unwrap(),
        allowance
    );
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;
}

#[test(tokio::test)]
async fn test_native_leg_is_refunded_natively() {
    let fixture = Fixture::new();
    fixture
        .approve(ALICE, USDC, usdc("500"))
        .await;
    let native_before = fixture.native(ALICE).await;

    let receipt = fixture
        .orchestrator
        .new_position(
            CallContext::new(ALICE).with_value(ether("0.5")),
            weth_usdc_request(ether("0.5"), usdc("500"), 60),
        )
        .await
        .unwrap();

    let weth_leg = receipt.leg_for(weth()).unwrap();
    assert_eq!(weth_leg.funding, Funding::Native);
    assert!(weth_leg.used < ether("0.5"));
    assert_eq!(weth_leg.refunded, ether("0.5") - weth_leg.used);
    assert_eq!(fixture.native(ALICE).await, native_before - weth_leg.used);
    assert_eq!(fixture.balance(weth(), ALICE).await, U256::ZERO);
    assert_eq!(receipt.leg_for(USDC).unwrap().used, usdc("500"));
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;
}

#[test(tokio::test)]
async fn test_token_order_does_not_change_outcome() {
    let request = weth_usdc_request(ether("0.5"), usdc("1000"), 10);
    let mut receipts = Vec::new();
    for request in [request.clone(), request.reversed()] {
        let fixture = Fixture::new();
        fixture.wrap(ALICE, ether("1")).await;
        fixture
            .approve(ALICE, weth(), ether("0.5"))
            .await;
        fixture
            .approve(ALICE, USDC, usdc("1000"))
            .await;
        receipts.push(
            fixture
                .orchestrator
                .new_position(CallContext::new(ALICE), request)
                .await
                .unwrap(),
        );
    }

    assert_eq!(receipts[0], receipts[1]);
}

#[test(tokio::test)]
async fn test_increase_requires_ownership() {
    let fixture = Fixture::new();
    fixture.wrap(ALICE, ether("1")).await;
    fixture
        .approve(ALICE, weth(), ether("0.5"))
        .await;
    fixture
        .approve(ALICE, USDC, usdc("1000"))
        .await;
    let receipt = fixture
        .orchestrator
        .new_position(CallContext::new(ALICE), weth_usdc_request(ether("0.5"), usdc("1000"), 10))
        .await
        .unwrap();
    fixture
        .approve(BOB, USDC, usdc("200"))
        .await;

    let err = fixture
        .orchestrator
        .increase_liquidity(
            CallContext::new(BOB).with_value(ether("0.1")),
            IncreaseRequest::new(
                receipt.position_id,
                weth_usdc_request(ether("0.1"), usdc("200"), 10),
            ),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Ownership { owner, caller, .. } if owner == ALICE && caller == BOB
    ));
    assert_eq!(fixture.balance(USDC, BOB).await, usdc("10000"));
    assert_eq!(fixture.native(BOB).await, ether("100"));
}

#[test(tokio::test)]
async fn test_single_sided_positions() {
    let fixture = Fixture::new();

    // USDC/USDT below the range and WBTC/USDC above it, in canonical terms USDC is the
    // only leg the pool accepts in both cases.
    for (other, fee, lower, upper) in
        [(USDT, FeeTier::LOWEST, -10, 10), (WBTC, FeeTier::MEDIUM, 63000, 64020)]
    {
        fixture
            .approve(ALICE, USDC, usdc("20"))
            .await;
        let before = fixture.balance(USDC, ALICE).await;

        let receipt = fixture
            .orchestrator
            .new_position(
                CallContext::new(ALICE),
                PositionRequest {
                    token0: USDC,
                    token1: other,
                    amount0: usdc("20"),
                    amount1: U256::ZERO,
                    fee_tier: fee,
                    tick_lower: lower,
                    tick_upper: upper,
                    slippage: 1,
                },
            )
            .await
            .unwrap();

        assert!(receipt.liquidity > 0);
        assert_eq!(receipt.leg_for(USDC).unwrap().used, usdc("20"));
        assert_eq!(receipt.leg_for(other).unwrap().used, U256::ZERO);
        assert_eq!(fixture.balance(USDC, ALICE).await, before - usdc("20"));
        fixture
            .assert_no_residue(&[USDC, other])
            .await;
    }
}

#[test(tokio::test)]
async fn test_price_move_unwinds_custody() {
    let fixture = Fixture::new();
    fixture.wrap(ALICE, ether("1")).await;
    fixture
        .approve(ALICE, weth(), ether("0.5"))
        .await;
    fixture
        .approve(ALICE, USDC, usdc("1000"))
        .await;
    fixture
        .sandbox
        .set_pool_tick(USDC, weth(), FeeTier::MEDIUM, 195000)
        .unwrap();
    assert_eq!(
        fixture
            .sandbox
            .pool_tick(USDC, weth(), FeeTier::MEDIUM)
            .unwrap(),
        Some(195000)
    );

    let err = fixture
        .orchestrator
        .new_position(CallContext::new(ALICE), weth_usdc_request(ether("0.5"), usdc("1000"), 10))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::SlippageExceeded(SlippageViolation::RejectedByPositionManager { .. })
    ));
    assert_eq!(fixture.balance(USDC, ALICE).await, usdc("10000"));
    assert_eq!(fixture.balance(weth(), ALICE).await, ether("1"));
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;
}

#[test(tokio::test)]
async fn test_expired_deadline_unwinds_custody() {
    let fixture = Fixture::new();
    fixture.wrap(ALICE, ether("1")).await;
    fixture
        .approve(ALICE, weth(), ether("0.5"))
        .await;
    fixture
        .approve(ALICE, USDC, usdc("1000"))
        .await;
    // The orchestrator reads a clock frozen at genesis while the chain mines past the deadline.
    let lagging_clock = SandboxChain::for_chain(Chain::Ethereum, GENESIS_TIMESTAMP).unwrap();
    let collaborators = Collaborators {
        clock: Arc::new(lagging_clock),
        ..Collaborators::from_chain(fixture.sandbox.clone())
    };
    let config = fixture
        .orchestrator
        .config()
        .clone()
        .with_deadline_buffer(Duration::from_secs(30));
    let orchestrator =
        PositionOrchestrator::new(fixture.orchestrator.address(), config, collaborators);
    fixture
        .sandbox
        .set_timestamp(GENESIS_TIMESTAMP + 31)
        .unwrap();

    let err = orchestrator
        .new_position(CallContext::new(ALICE), weth_usdc_request(ether("0.5"), usdc("1000"), 10))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::DeadlineExpired { deadline } if deadline == GENESIS_TIMESTAMP + 30
    ));
    assert!(!err.leaves_residue());
    assert_eq!(fixture.balance(USDC, ALICE).await, usdc("10000"));
    assert_eq!(fixture.balance(weth(), ALICE).await, ether("1"));
    assert_eq!(
        fixture
            .sandbox
            .position_balance(ALICE)
            .await
            .unwrap(),
        U256::ZERO
    );
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;
}

#[test(tokio::test)]
async fn test_rejected_transfer_unwinds_earlier_legs() {
    let fixture = Fixture::new();
    let stubborn = Address::repeat_byte(0xEE);
    fixture
        .sandbox
        .register_token(stubborn, "STUB", 18)
        .unwrap();
    fixture
        .sandbox
        .mint_tokens(stubborn, ALICE, ether("10"))
        .unwrap();
    fixture
        .sandbox
        .create_pool(USDC, stubborn, FeeTier::MEDIUM, 0)
        .unwrap();
    fixture
        .approve(ALICE, USDC, usdc("100"))
        .await;
    fixture
        .approve(ALICE, stubborn, ether("1"))
        .await;
    fixture
        .sandbox
        .set_token_behaviour(stubborn, TokenBehaviour::ReturnsFalse)
        .unwrap();

    let err = fixture
        .orchestrator
        .new_position(
            CallContext::new(ALICE),
            PositionRequest {
                token0: stubborn,
                token1: USDC,
                amount0: ether("1"),
                amount1: usdc("100"),
                fee_tier: FeeTier::MEDIUM,
                tick_lower: -600,
                tick_upper: 600,
                slippage: 10,
            },
        )
        .await;

    assert!(matches!(
        err,
        Err(OrchestratorError::Custody { token, reason: CustodyFailure::TransferRejected, .. })
            if token == stubborn
    ));
    assert_eq!(fixture.balance(USDC, ALICE).await, usdc("10000"));
    assert_eq!(fixture.balance(stubborn, ALICE).await, ether("10"));
    assert_eq!(fixture.balance(USDC, fixture.orchestrator.address()).await, U256::ZERO);
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_concurrent_calls_leave_no_holdings() {
    let fixture = Fixture::new();
    for user in [ALICE, BOB] {
        fixture.wrap(user, ether("1")).await;
        fixture
            .approve(user, weth(), ether("0.5"))
            .await;
        fixture
            .approve(user, USDC, usdc("1000"))
            .await;
    }

    let request = weth_usdc_request(ether("0.5"), usdc("1000"), 10);
    let (alice, bob) = tokio::join!(
        fixture
            .orchestrator
            .new_position(CallContext::new(ALICE), request.clone()),
        fixture
            .orchestrator
            .new_position(CallContext::new(BOB), request),
    );
    let (alice, bob) = (alice.unwrap(), bob.unwrap());

    assert_ne!(alice.position_id, bob.position_id);
    assert_eq!(alice.liquidity, bob.liquidity);
    assert_eq!(
        fixture
            .sandbox
            .owner_of(bob.position_id)
            .await
            .unwrap(),
        BOB
    );
    fixture
        .assert_no_residue(&[USDC, weth()])
        .await;
}

#[test(tokio::test)]
async fn test_bundled_scenario_runs() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/mainnet_fork.yaml");
    let scenario = Scenario::from_yaml(&path).unwrap();
    let mut deployment = scenario.deploy().unwrap();

    let reports = deployment
        .run(&scenario.steps)
        .await
        .unwrap();

    assert_eq!(reports.len(), scenario.steps.len());
    let failures = reports
        .iter()
        .filter(|report| matches!(report.outcome, StepOutcome::Failed(_)))
        .count();
    assert_eq!(failures, 2);
    let orchestrator = deployment.orchestrator.address();
    assert_eq!(
        deployment
            .sandbox
            .balance_of(USDC, orchestrator)
            .await
            .unwrap(),
        U256::ZERO
    );
}
