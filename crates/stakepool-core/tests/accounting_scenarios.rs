//! # Accounting Scenarios
//!
//! End-to-end scenarios over the public API: limiter budget, withdrawal
//! finalization and claims, fee distribution and deposit allocation.

#[cfg(test)]
mod tests {
    use ethnum::U256;
    use stakepool_core::allocation::allocate;
    use stakepool_core::*;

    const E: u128 = ONE_ETHER;

    fn ether(n: u128) -> U256 {
        U256::from(n * E)
    }

    #[test]
    fn test_limiter_one_percent_budget() {
        let mut limiter = LimiterState::init(10_000_000, ether(100), ether(100)).unwrap();

        assert_eq!(limiter.append_ether(ether(2)).unwrap(), ether(1));
        assert_eq!(limiter.used_limit(), limiter.max_limit());
        assert!(limiter.is_limit_reached());
        assert_eq!(limiter.append_ether(ether(1)).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_two_request_finalize_and_claim() {
        let mut queue = WithdrawalQueue::new(WithdrawalLimits { min: 100, max: 1_000 * E });
        let alice = Address::from_low_u64(1);
        let bob = Address::from_low_u64(2);
        queue.enqueue(alice, 5 * E, 5 * E, 1).unwrap();
        queue.enqueue(bob, 7 * E, 7 * E, 2).unwrap();
        assert_eq!(queue.request(1).unwrap().cumulative_ether, 12 * E);

        // One wei short of the lock
        assert!(matches!(
            queue.finalize(1, 12 * E, 100 * E, 100 * E, 12 * E - 1),
            Err(StakingCoreError::InsufficientEscrow { .. })
        ));
        queue.finalize(1, 12 * E, 100 * E, 100 * E, 12 * E).unwrap();

        let mut escrow = InMemoryEscrow::with_balance(12 * E);
        assert_eq!(queue.claim(0, Some(0), &mut escrow).unwrap().amount, 5 * E);

        let err = queue.claim(0, Some(0), &mut escrow).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyDone);
        assert_eq!(escrow.paid_to(&alice), 5 * E);
    }

    #[test]
    fn test_finalization_params_fit_escrow() {
        let mut queue = WithdrawalQueue::new(WithdrawalLimits { min: 0, max: u128::MAX });
        let owner = Address::from_low_u64(7);
        for i in 1..=5u128 {
            queue.enqueue(owner, i * E, i * E, 0).unwrap();
        }

        // Rate 0.97: every request is discounted
        let params = queue.calculate_finalization_params(4, 97 * E, 100 * E).unwrap();
        assert_eq!(params.shares_to_burn, 15 * E);
        assert_eq!(params.ether_to_lock, 15 * E * 97 / 100);
        queue
            .finalize(4, params.ether_to_lock, 97 * E, 100 * E, params.ether_to_lock)
            .unwrap();
        assert_eq!(queue.total_locked(), params.ether_to_lock);
    }

    #[test]
    fn test_reward_distribution_with_stopped_module() {
        let modules = [
            ModuleRecord::new(1, "curated", Address::from_low_u64(1))
                .with_fees(500, 500)
                .with_keys(100, 0),
            ModuleRecord::new(2, "community", Address::from_low_u64(2))
                .with_fees(800, 200)
                .with_keys(100, 0)
                .with_status(ModuleStatus::Stopped),
            ModuleRecord::new(3, "empty", Address::from_low_u64(3)).with_fees(500, 500),
        ];

        let result = distribute(&modules).unwrap();
        assert_eq!(result.module_ids, vec![1, 2]);
        assert_eq!(result.module_fees, vec![FEE_PRECISION_POINTS / 40, 0]);
        assert_eq!(result.total_fee, FEE_PRECISION_POINTS / 10);
        assert!(result.total_fee < result.precision_points);
    }

    #[test]
    fn test_allocation_scenario() {
        let (allocated, counts) = allocate(&[10, 10], &[20, 15], 10).unwrap();
        assert_eq!((allocated, counts), (10, vec![15, 15]));

        let (allocated, counts) = allocate(&[10, 10], &[20, 15], 30).unwrap();
        assert_eq!((allocated, counts), (15, vec![20, 15]));
    }

    #[test]
    fn test_pool_lifecycle() {
        let treasury = Address::repeat_byte(0xee);
        let config = PoolConfig {
            max_positive_rebase: 10_000_000,
            treasury,
            ..PoolConfig::default()
        };
        let mut pool = StakingPool::new(config).unwrap();
        pool.registry_mut()
            .add_module(
                ModuleRecord::new(1, "curated", Address::from_low_u64(1))
                    .with_fees(500, 500)
                    .with_keys(0, 100),
            )
            .unwrap();
        let mut escrow = InMemoryEscrow::new();
        let user = Address::from_low_u64(42);

        pool.submit(user, 96 * E).unwrap();
        assert_eq!(pool.deposit_buffered(10, 1).unwrap().allocated, 3);

        // Rewards arrive, then the user exits part of the position
        let report = OracleReport {
            ref_block: 10,
            consensus_balance_delta: (E / 2) as i128,
            ..OracleReport::default()
        };
        pool.handle_report(&report, &mut escrow).unwrap();
        assert!(pool.value_of(&user).unwrap() > 96 * E);

        pool.submit(Address::from_low_u64(43), 10 * E).unwrap();
        let id = pool.request_withdrawal(user, 5 * E, 11).unwrap();
        let report = OracleReport {
            ref_block: 20,
            finalize_up_to: Some(id),
            ..OracleReport::default()
        };
        let outcome = pool.handle_report(&report, &mut escrow).unwrap();
        let locked = outcome.finalization.unwrap().ether_to_lock;
        assert!(locked > 5 * E);
        assert_eq!(escrow.balance(), locked);

        let hint = pool.queue().find_price_hint_indexed(id).unwrap();
        let receipt = pool.claim(id, Some(hint), &mut escrow).unwrap();
        assert_eq!(receipt.amount, locked);
        assert_eq!(escrow.paid_to(&user), locked);
        assert_eq!(pool.queue().total_locked(), 0);
    }

    #[cfg(feature = "client")]
    #[test]
    fn test_snapshot_json_roundtrip() {
        let mut pool = StakingPool::new(PoolConfig::default()).unwrap();
        pool.submit(Address::from_low_u64(1), 50 * E).unwrap();
        pool.request_withdrawal(Address::from_low_u64(1), 5 * E, 3).unwrap();

        let json = serde_json::to_string(&pool.snapshot()).unwrap();
        let snapshot: PoolSnapshot = serde_json::from_str(&json).unwrap();
        let restored = StakingPool::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.snapshot(), pool.snapshot());
    }
}
