use tracing::debug;
use tycho_liquidity_common::{
    models::{
        error::revert_reasons, CallContext, FeeTier, IncreaseRequest, Leg, PositionId,
        PositionRequest, TickRange, TokenPair,
    },
    Address, U256,
};

use super::Collaborators;
use crate::{
    config::OrchestratorConfig,
    errors::{OrchestratorError, ValidationError},
};

/// A validated request in canonical token order.
///
/// This is the only representation of a request the later stages see, so the token order is
/// decided exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub pair: TokenPair,
    pub amounts: [U256; 2],
    pub fee_tier: FeeTier,
    pub tick_range: TickRange,
    pub slippage: u32,
    /// Leg funded by the native value attached to the call.
    pub native_leg: Option<Leg>,
    /// Whether the caller listed the tokens in the opposite order.
    pub reversed: bool,
}

impl CanonicalRequest {
    pub fn amount(&self, leg: Leg) -> U256 {
        self.amounts[leg.index()]
    }

    pub fn token(&self, leg: Leg) -> Address {
        self.pair.token(leg)
    }

    /// Legs with a nonzero amount.
    pub fn funded_legs(&self) -> impl Iterator<Item = Leg> + '_ {
        Leg::BOTH
            .into_iter()
            .filter(|leg| !self.amount(*leg).is_zero())
    }
}

pub(crate) struct RequestValidator<'a> {
    config: &'a OrchestratorConfig,
    collaborators: &'a Collaborators,
}

impl<'a> RequestValidator<'a> {
    pub fn new(config: &'a OrchestratorConfig, collaborators: &'a Collaborators) -> Self {
        Self { config, collaborators }
    }

    /// Checks that only depend on the request itself, and sorts it.
    pub fn normalize(
        &self,
        ctx: &CallContext,
        request: &PositionRequest,
    ) -> Result<CanonicalRequest, ValidationError> {
        if request.token0 == Address::ZERO || request.token1 == Address::ZERO {
            return Err(ValidationError::ZeroAddress);
        }
        if request.token0 == request.token1 {
            return Err(ValidationError::IdenticalTokens(request.token0));
        }

        let tick_range = request.tick_range();
        if !tick_range.is_ordered() {
            return Err(ValidationError::InvalidTickRange {
                lower: tick_range.tick_lower,
                upper: tick_range.tick_upper,
            });
        }
        if !tick_range.within_bounds() {
            return Err(ValidationError::TickOutOfBounds {
                lower: tick_range.tick_lower,
                upper: tick_range.tick_upper,
            });
        }
        if !request.fee_tier.is_representable() {
            return Err(ValidationError::UnknownFeeTier(request.fee_tier));
        }

        if request.amount0.is_zero() && request.amount1.is_zero() {
            return Err(ValidationError::EmptyRequest);
        }
        let max = self.config.slippage_model.denominator();
        if request.slippage > max {
            return Err(ValidationError::SlippageOutOfRange { slippage: request.slippage, max });
        }

        let (pair, reversed) = TokenPair::canonical(request.token0, request.token1);
        let amounts = if reversed {
            [request.amount1, request.amount0]
        } else {
            [request.amount0, request.amount1]
        };

        let native_leg = if ctx.value.is_zero() {
            None
        } else {
            let leg = pair
                .leg_of(self.config.wrapped_native)
                .ok_or(ValidationError::UnexpectedNativeValue(ctx.value))?;
            if amounts[leg.index()] != ctx.value {
                return Err(ValidationError::NativeValueMismatch {
                    value: ctx.value,
                    amount: amounts[leg.index()],
                });
            }
            Some(leg)
        };

        Ok(CanonicalRequest {
            pair,
            amounts,
            fee_tier: request.fee_tier,
            tick_range,
            slippage: request.slippage,
            native_leg,
            reversed,
        })
    }

    /// Validates a request for a new position against the factory.
    pub async fn validate_new(
        &self,
        ctx: &CallContext,
        request: &PositionRequest,
    ) -> Result<CanonicalRequest, OrchestratorError> {
        let canonical = self.normalize(ctx, request)?;
        self.check_pool(&canonical).await?;
        debug!(pair = ?canonical.pair, reversed = canonical.reversed, "Request validated");
        Ok(canonical)
    }

    /// Validates a request to grow `request.position_id`.
    ///
    /// Besides the pool checks, the position must exist, belong to the caller and match the
    /// echoed pair, fee tier and tick range.
    pub async fn validate_increase(
        &self,
        ctx: &CallContext,
        request: &IncreaseRequest,
    ) -> Result<CanonicalRequest, OrchestratorError> {
        let canonical = self.normalize(ctx, &request.position)?;
        self.check_pool(&canonical).await?;
        self.check_position(ctx, request.position_id, &canonical)
            .await?;
        debug!(
            position_id = %request.position_id,
            pair = ?canonical.pair,
            "Increase request validated"
        );
        Ok(canonical)
    }

    async fn check_pool(&self, request: &CanonicalRequest) -> Result<(), OrchestratorError> {
        let factory = &self.collaborators.factory;
        let spacing = factory
            .fee_amount_tick_spacing(request.fee_tier)
            .await?
            .ok_or(ValidationError::UnknownFeeTier(request.fee_tier))?;
        if !request.tick_range.is_aligned(spacing) {
            return Err(ValidationError::TickNotAligned {
                lower: request.tick_range.tick_lower,
                upper: request.tick_range.tick_upper,
                spacing,
            }
            .into());
        }

        let pair = request.pair;
        factory
            .get_pool(pair.token0, pair.token1, request.fee_tier)
            .await?
            .ok_or(ValidationError::PoolNotFound {
                token0: pair.token0,
                token1: pair.token1,
                fee: request.fee_tier,
            })?;
        Ok(())
    }

    async fn check_position(
        &self,
        ctx: &CallContext,
        position_id: PositionId,
        request: &CanonicalRequest,
    ) -> Result<(), OrchestratorError> {
        let position_manager = &self.collaborators.position_manager;
        let info = match position_manager.positions(position_id).await {
            Ok(info) => info,
            Err(err) if err.is_revert_with(revert_reasons::INVALID_TOKEN_ID) => {
                return Err(ValidationError::UnknownPosition(position_id).into())
            }
            Err(err) => return Err(err.into()),
        };
        let owner = position_manager
            .owner_of(position_id)
            .await?;
        if owner != ctx.caller {
            return Err(OrchestratorError::Ownership { position_id, owner, caller: ctx.caller });
        }

        let mismatch = if info.token0 != request.pair.token0 || info.token1 != request.pair.token1
        {
            Some("token pair")
        } else if info.fee != request.fee_tier {
            Some("fee tier")
        } else if TickRange::new(info.tick_lower, info.tick_upper) != request.tick_range {
            Some("tick range")
        } else {
            None
        };
        match mismatch {
            Some(field) => Err(ValidationError::PositionMismatch { position_id, field }.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use tycho_liquidity_common::{
        models::{ContractError, PositionInfo},
        traits::*,
    };

    use super::*;

    const WETH: Address = Address::repeat_byte(0xCC);
    const USDC: Address = Address::repeat_byte(0xAA);
    const CALLER: Address = Address::repeat_byte(0x42);

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::new(
            Address::repeat_byte(0x01),
            WETH,
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
        )
    }

    fn collaborators(
        factory: MockPoolFactory,
        position_manager: MockPositionManager,
    ) -> Collaborators {
        Collaborators {
            assets: Arc::new(MockFungibleAsset::new()),
            wrapped_native: Arc::new(MockWrappedNativeAsset::new()),
            native: Arc::new(MockNativeCurrency::new()),
            position_manager: Arc::new(position_manager),
            factory: Arc::new(factory),
            clock: Arc::new(MockBlockClock::new()),
        }
    }

    fn working_factory() -> MockPoolFactory {
        let mut factory = MockPoolFactory::new();
        factory
            .expect_fee_amount_tick_spacing()
            .returning(|fee| Ok((fee == FeeTier::MEDIUM).then_some(60)));
        factory
            .expect_get_pool()
            .returning(|_, _, _| Ok(Some(Address::repeat_byte(0x99))));
        factory
    }

    fn request() -> PositionRequest {
        PositionRequest {
            token0: WETH,
            token1: USDC,
            amount0: U256::from(5u64),
            amount1: U256::from(1000u64),
            fee_tier: FeeTier::MEDIUM,
            tick_lower: 170040,
            tick_upper: 200040,
            slippage: 10,
        }
    }

    fn position_info(token0: Address, token1: Address) -> PositionInfo {
        PositionInfo {
            nonce: 0,
            operator: Address::ZERO,
            token0,
            token1,
            fee: FeeTier::MEDIUM,
            tick_lower: 170040,
            tick_upper: 200040,
            liquidity: 10,
            fee_growth_inside0_last_x128: U256::ZERO,
            fee_growth_inside1_last_x128: U256::ZERO,
            tokens_owed0: 0,
            tokens_owed1: 0,
        }
    }

    #[test]
    fn test_normalize_sorts_tokens_and_amounts() {
        let config = config();
        let collaborators = collaborators(MockPoolFactory::new(), MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);

        let canonical = validator
            .normalize(&CallContext::new(CALLER), &request())
            .unwrap();

        assert!(canonical.reversed);
        assert_eq!(canonical.pair, TokenPair { token0: USDC, token1: WETH });
        assert_eq!(canonical.amounts, [U256::from(1000u64), U256::from(5u64)]);
        assert_eq!(canonical.native_leg, None);
        assert_eq!(
            validator
                .normalize(&CallContext::new(CALLER), &request().reversed())
                .unwrap()
                .pair,
            canonical.pair
        );
    }

    #[rstest]
    #[case::identical(
        PositionRequest { token1: WETH, ..request() },
        ValidationError::IdenticalTokens(WETH)
    )]
    #[case::zero_address(
        PositionRequest { token0: Address::ZERO, ..request() },
        ValidationError::ZeroAddress
    )]
    #[case::unordered_ticks(
        PositionRequest { tick_lower: 200040, tick_upper: 170040, ..request() },
        ValidationError::InvalidTickRange { lower: 200040, upper: 170040 }
    )]
    #[case::equal_ticks(
        PositionRequest { tick_lower: 60, tick_upper: 60, ..request() },
        ValidationError::InvalidTickRange { lower: 60, upper: 60 }
    )]
    #[case::out_of_bounds(
        PositionRequest { tick_lower: -887280, tick_upper: 60, ..request() },
        ValidationError::TickOutOfBounds { lower: -887280, upper: 60 }
    )]
    #[case::empty(
        PositionRequest { amount0: U256::ZERO, amount1: U256::ZERO, ..request() },
        ValidationError::EmptyRequest
    )]
    #[case::slippage(
        PositionRequest { slippage: 101, ..request() },
        ValidationError::SlippageOutOfRange { slippage: 101, max: 100 }
    )]
    #[case::fee_not_uint24(
        PositionRequest { fee_tier: FeeTier(1 << 24), ..request() },
        ValidationError::UnknownFeeTier(FeeTier(1 << 24))
    )]
    fn test_normalize_rejects(#[case] request: PositionRequest, #[case] expected: ValidationError) {
        let config = config();
        let collaborators = collaborators(MockPoolFactory::new(), MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);

        let err = validator
            .normalize(&CallContext::new(CALLER), &request)
            .unwrap_err();

        assert_eq!(err, expected);
    }

    #[rstest]
    #[case(U256::from(5u64), Ok(Some(Leg::Token1)))]
    #[case(
        U256::from(4u64),
        Err(ValidationError::NativeValueMismatch {
            value: U256::from(4u64),
            amount: U256::from(5u64),
        })
    )]
    fn test_normalize_native_value(
        #[case] value: U256,
        #[case] expected: Result<Option<Leg>, ValidationError>,
    ) {
        let config = config();
        let collaborators = collaborators(MockPoolFactory::new(), MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);

        let result = validator
            .normalize(&CallContext::new(CALLER).with_value(value), &request())
            .map(|canonical| canonical.native_leg);

        assert_eq!(result, expected);
    }

    #[test]
    fn test_normalize_rejects_native_value_without_wrapped_leg() {
        let config = config();
        let collaborators = collaborators(MockPoolFactory::new(), MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);
        let request = PositionRequest { token0: Address::repeat_byte(0xBB), ..request() };

        let err = validator
            .normalize(&CallContext::new(CALLER).with_value(U256::from(1u64)), &request)
            .unwrap_err();

        assert_eq!(err, ValidationError::UnexpectedNativeValue(U256::from(1u64)));
    }

    #[tokio::test]
    async fn test_validate_new_rejects_disabled_fee_tier() {
        let config = config();
        let collaborators = collaborators(working_factory(), MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);
        let request = PositionRequest { fee_tier: FeeTier(2500), ..request() };

        let err = validator
            .validate_new(&CallContext::new(CALLER), &request)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Validation(ValidationError::UnknownFeeTier(FeeTier(2500)))
        ));
    }

    #[tokio::test]
    async fn test_validate_new_rejects_unaligned_ticks() {
        let config = config();
        let collaborators = collaborators(working_factory(), MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);
        let request = PositionRequest { tick_lower: 170050, ..request() };

        let err = validator
            .validate_new(&CallContext::new(CALLER), &request)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Validation(ValidationError::TickNotAligned { spacing: 60, .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_new_rejects_missing_pool() {
        let config = config();
        let mut factory = MockPoolFactory::new();
        factory
            .expect_fee_amount_tick_spacing()
            .returning(|_| Ok(Some(60)));
        factory
            .expect_get_pool()
            .returning(|_, _, _| Ok(None));
        let collaborators = collaborators(factory, MockPositionManager::new());
        let validator = RequestValidator::new(&config, &collaborators);

        let err = validator
            .validate_new(&CallContext::new(CALLER), &request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Validation(ValidationError::PoolNotFound { token0, token1, .. })
                if token0 == USDC && token1 == WETH
        ));
    }

    #[tokio::test]
    async fn test_validate_increase_checks_owner() {
        let config = config();
        let stranger = Address::repeat_byte(0x77);
        let mut position_manager = MockPositionManager::new();
        position_manager
            .expect_positions()
            .returning(|_| Ok(position_info(USDC, WETH)));
        position_manager
            .expect_owner_of()
            .returning(move |_| Ok(stranger));
        let collaborators = collaborators(working_factory(), position_manager);
        let validator = RequestValidator::new(&config, &collaborators);

        let err = validator
            .validate_increase(
                &CallContext::new(CALLER),
                &IncreaseRequest::new(U256::from(1u64), request()),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Ownership { owner, caller, .. }
                if owner == stranger && caller == CALLER
        ));
    }

    #[tokio::test]
    async fn test_validate_increase_unknown_position() {
        let config = config();
        let mut position_manager = MockPositionManager::new();
        position_manager
            .expect_positions()
            .returning(|_| Err(ContractError::reverted(revert_reasons::INVALID_TOKEN_ID)));
        position_manager.expect_owner_of().never();
        let collaborators = collaborators(working_factory(), position_manager);
        let validator = RequestValidator::new(&config, &collaborators);

        let err = validator
            .validate_increase(
                &CallContext::new(CALLER),
                &IncreaseRequest::new(U256::from(8u64), request()),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Validation(ValidationError::UnknownPosition(id))
                if id == U256::from(8u64)
        ));
    }

    #[rstest]
    #[case(position_info(USDC, WETH), None)]
    #[case(position_info(USDC, Address::repeat_byte(0xDD)), Some("token pair"))]
    #[case(PositionInfo { fee: FeeTier::LOW, ..position_info(USDC, WETH) }, Some("fee tier"))]
    #[case(PositionInfo { tick_upper: 200100, ..position_info(USDC, WETH) }, Some("tick range"))]
    #[tokio::test]
    async fn test_validate_increase_matches_position(
        #[case] info: PositionInfo,
        #[case] mismatch: Option<&'static str>,
    ) {
        let config = config();
        let mut position_manager = MockPositionManager::new();
        position_manager
            .expect_owner_of()
            .returning(|_| Ok(CALLER));
        position_manager
            .expect_positions()
            .returning(move |_| Ok(info.clone()));
        let collaborators = collaborators(working_factory(), position_manager);
        let validator = RequestValidator::new(&config, &collaborators);

        let result = validator
            .validate_increase(
                &CallContext::new(CALLER),
                &IncreaseRequest::new(U256::from(1u64), request()),
            )
            .await;

        match mismatch {
            None => assert!(result.is_ok()),
            Some(expected) => assert!(matches!(
                result,
                Err(OrchestratorError::Validation(ValidationError::PositionMismatch { field, .. }))
                    if field == expected
            )),
        }
    }
}
