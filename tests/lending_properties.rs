//! Stock and ledger invariants over random checkout/return sequences

use std::collections::HashSet;
use std::sync::Arc;

use circulation_registry::{
    clock::SystemClock,
    models::{AccountDraft, AccountId, CatalogDraft, ItemKey},
    repository::memory::MemoryRegistry,
    Services,
};
use indexmap::IndexSet;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Checkout(usize),
    Return(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize).prop_map(Op::Checkout),
        (0..4usize).prop_map(Op::Return),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

async fn setup(total: i32) -> (MemoryRegistry, Services, Vec<AccountId>, ItemKey) {
    let registry = MemoryRegistry::new();
    let services = Services::new(Arc::new(registry.clone()), Arc::new(SystemClock));
    let key = ItemKey::new("978-4-00-000000-1");

    services
        .catalog
        .create(CatalogDraft {
            key: key.clone(),
            title: "Shared title".to_string(),
            creator: "Creator".to_string(),
            distributor: "Distributor".to_string(),
            note: None,
            total_copies: total,
        })
        .await
        .expect("create item");

    let mut accounts = Vec::new();
    for i in 0..4 {
        let account = services
            .accounts
            .create(AccountDraft {
                username: format!("patron{}", i),
                email: format!("patron{}@example.org", i),
                is_admin: false,
                password_hash: "hash".to_string(),
            })
            .await
            .expect("create account");
        accounts.push(account.id);
    }

    (registry, services, accounts, key)
}

async fn check_invariants(registry: &MemoryRegistry, key: &ItemKey) -> Result<(), TestCaseError> {
    let item = registry.item(key).await.expect("item exists");
    let loans = registry.loans().await;
    let open: Vec<_> = loans.iter().filter(|l| l.is_open()).collect();

    prop_assert!(item.available_copies >= 0);
    prop_assert!(item.available_copies <= item.total_copies);
    prop_assert_eq!(i64::from(item.on_loan()), open.len() as i64);

    let mut holders = HashSet::new();
    for loan in &open {
        prop_assert!(holders.insert(loan.account_id), "two open loans for one account");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn counters_always_match_open_loans(total in 0..4i32, ops in prop::collection::vec(op(), 0..40)) {
        runtime().block_on(async {
            let (registry, services, accounts, key) = setup(total).await;
            let request: IndexSet<ItemKey> = [key.clone()].into_iter().collect();

            for op in ops {
                match op {
                    Op::Checkout(i) => {
                        let outcome = services.lending.checkout(accounts[i], &request).await;
                        prop_assert!(outcome.is_ok(), "checkout failed: {:?}", outcome);
                    }
                    Op::Return(i) => {
                        if let Err(e) = services.lending.return_item(accounts[i], &key).await {
                            prop_assert!(!e.is_store_failure(), "return failed: {:?}", e);
                        }
                    }
                }
                check_invariants(&registry, &key).await?;
            }

            let audit = services.lending.audit_stock().await;
            prop_assert!(matches!(audit, Ok(ref report) if report.is_empty()));
            Ok(())
        })?;
    }
}
