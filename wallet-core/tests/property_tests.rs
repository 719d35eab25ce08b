//! Property-based tests for ledger invariants
//!
//! - Balances never go negative
//! - Transfers are zero-sum; only credited deposits change the total
//! - Money arithmetic is exact

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::config::WalletConfig;
use wallet_core::{MemoryLedgerStore, MockGateway, Money, WalletError, WalletMetrics, WalletService};

const USERS: usize = 3;

/// Strategy for generating valid amounts (positive, two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..500_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Deposit { user: usize, amount: Decimal, succeed: bool },
    Transfer { from: usize, to: usize, amount: Decimal },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..USERS, amount_strategy(), any::<bool>())
            .prop_map(|(user, amount, succeed)| Op::Deposit { user, amount, succeed }),
        (0..USERS, 0..USERS, amount_strategy())
            .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balances_never_negative_and_conserved(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let outcome: Result<(), TestCaseError> = runtime().block_on(async {
            let store = MemoryLedgerStore::new();
            let service = WalletService::new(
                Arc::new(store.clone()),
                Arc::new(MockGateway::new("sk_prop")),
                WalletConfig::default(),
                WalletMetrics::new().unwrap(),
            );

            let users: Vec<Uuid> = (0..USERS).map(|_| Uuid::new_v4()).collect();
            let mut numbers = Vec::new();
            for user in &users {
                let wallet = service.create_wallet(*user).await.unwrap();
                numbers.push(wallet.wallet_number.as_str().to_string());
            }

            let mut expected_total = Money::zero();
            for op in ops {
                match op {
                    Op::Deposit { user, amount, succeed } => {
                        let init = service
                            .initialize_deposit(users[user], amount, "prop@example.com")
                            .await
                            .unwrap();
                        let status = if succeed { "success" } else { "failed" };
                        service.reconcile_webhook(&init.reference, status).await.unwrap();
                        if succeed {
                            expected_total = expected_total.checked_add(init.amount).unwrap();
                        }
                    }
                    Op::Transfer { from, to, amount } => {
                        let before_from = service.get_balance(users[from]).await.unwrap().balance;
                        let before_to = service.get_balance(users[to]).await.unwrap().balance;

                        let result = service.transfer(users[from], &numbers[to], amount).await;

                        let after_from = service.get_balance(users[from]).await.unwrap().balance;
                        let after_to = service.get_balance(users[to]).await.unwrap().balance;

                        match result {
                            Ok(_) => {
                                prop_assert_ne!(from, to);
                                prop_assert_eq!(
                                    before_from.checked_add(before_to),
                                    after_from.checked_add(after_to)
                                );
                            }
                            Err(WalletError::SelfTransfer) => {
                                prop_assert_eq!(from, to);
                            }
                            Err(WalletError::InsufficientBalance { .. }) => {
                                prop_assert!(before_from.as_decimal() < amount);
                                prop_assert_eq!(before_from, after_from);
                                prop_assert_eq!(before_to, after_to);
                            }
                            Err(other) => {
                                prop_assert!(false, "unexpected error {:?}", other);
                            }
                        }
                    }
                }

                for user in &users {
                    let balance = service.get_balance(*user).await.unwrap().balance;
                    prop_assert!(balance.as_decimal() >= Decimal::ZERO);
                }
                prop_assert_eq!(store.total_balance().await, expected_total);
            }
            Ok(())
        });
        outcome?;
    }

    #[test]
    fn prop_money_arithmetic_exact(a in 0i64..1_000_000_000_000, b in 0i64..1_000_000_000_000) {
        let x = Money::from_minor_units(a).unwrap();
        let y = Money::from_minor_units(b).unwrap();

        let sum = x.checked_add(y).unwrap();
        prop_assert_eq!(sum.to_minor_units().unwrap(), a + b);
        prop_assert_eq!(sum.as_decimal(), x.as_decimal() + y.as_decimal());

        match x.checked_sub(y) {
            Some(diff) => {
                prop_assert!(a >= b);
                prop_assert_eq!(diff.to_minor_units().unwrap(), a - b);
                prop_assert_eq!(diff.checked_add(y), Some(x));
            }
            None => {
                prop_assert!(a < b);
            }
        }
    }

    #[test]
    fn prop_minor_units_never_round(cents in 1i64..10_000_000_000) {
        let amount = Money::positive(Decimal::new(cents, 2)).unwrap();
        prop_assert_eq!(amount.to_minor_units().unwrap(), cents);
    }
}
