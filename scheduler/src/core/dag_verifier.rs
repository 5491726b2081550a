use log::debug;
use std::{collections::HashMap, sync::Arc};
use txsched_common::{
    dag::{build_dag, Dag},
    rwset::TxRwSet,
    transaction::{ExecOrderType, Transaction},
};

use super::error::SchedulerError;

/// Append `count` serially executed vertices: the first one depends on
/// every vertex present, each following one on its predecessor
pub fn append_serial_tail(dag: &mut Dag, count: usize) {
    for i in 0..count {
        if i == 0 {
            dag.push_after_all();
        } else {
            dag.push_after_last();
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrderCounts {
    pub normal: usize,
    pub iterator: usize,
    pub charge_gas: usize,
}

/// Classify the txs of a block by placement.
///
/// A normal tx after the first iterator is counted as an iterator, as is
/// any tx for which `serial` holds. The charge-gas tx, when expected, must
/// be the last one.
pub fn classify_exec_orders(
    txs: &[Arc<Transaction>],
    exec_orders: &HashMap<String, ExecOrderType>,
    serial: impl Fn(&str) -> bool,
    expect_charge_gas: bool,
) -> Result<OrderCounts, SchedulerError> {
    let mut counts = OrderCounts::default();
    let mut seen_iterator = false;

    for (index, tx) in txs.iter().enumerate() {
        let order = exec_orders
            .get(tx.id())
            .copied()
            .ok_or_else(|| SchedulerError::DagMismatch(format!("tx {} was not executed", tx.id())))?;

        match order {
            ExecOrderType::Normal if !seen_iterator && !serial(tx.id()) => counts.normal += 1,
            ExecOrderType::Normal | ExecOrderType::Iterator => {
                seen_iterator = true;
                counts.iterator += 1;
            }
            ExecOrderType::ChargeGas => {
                if index + 1 != txs.len() {
                    return Err(SchedulerError::DagMismatch(format!(
                        "charge gas tx {} at index {} is not last",
                        tx.id(),
                        index
                    )));
                }
                counts.charge_gas += 1;
            }
        }
    }

    if expect_charge_gas != (counts.charge_gas == 1) {
        return Err(SchedulerError::DagMismatch(format!(
            "expected {} charge gas tx, found {}",
            if expect_charge_gas { 1 } else { 0 },
            counts.charge_gas
        )));
    }

    Ok(counts)
}

/// Rebuild the DAG a proposer must have produced for `txs`
pub fn rebuild_dag(
    txs: &[Arc<Transaction>],
    rwsets: &HashMap<String, TxRwSet>,
    counts: OrderCounts,
    enable_sql_support: bool,
) -> Result<Dag, SchedulerError> {
    let normal_rwsets = txs[..counts.normal]
        .iter()
        .map(|tx| {
            rwsets
                .get(tx.id())
                .cloned()
                .ok_or_else(|| SchedulerError::DagMismatch(format!("tx {} has no rwset", tx.id())))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut dag = build_dag(&normal_rwsets, enable_sql_support);
    append_serial_tail(&mut dag, counts.iterator);
    if counts.charge_gas == 1 {
        dag.push_after_all();
    }
    Ok(dag)
}

/// Compare a rebuilt DAG with the one carried by the block
pub fn compare_dag(expected: &Dag, received: &Dag) -> Result<(), SchedulerError> {
    if expected.len() != received.len() {
        return Err(SchedulerError::DagMismatch(format!(
            "expected {} vertices, received {}",
            expected.len(),
            received.len()
        )));
    }

    for (index, (ours, theirs)) in expected.vertexes.iter().zip(&received.vertexes).enumerate() {
        if ours != theirs {
            if log::log_enabled!(log::Level::Debug) {
                debug!("[VERIFY] expected DAG {:?}", expected);
            }
            return Err(SchedulerError::DagMismatch(format!(
                "vertex {} expected neighbors {:?}, received {:?}",
                index, ours.neighbors, theirs.neighbors
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::invoke_tx;
    use txsched_common::dag::DagNeighbors;

    fn orders(entries: &[(&str, ExecOrderType)]) -> HashMap<String, ExecOrderType> {
        entries.iter().map(|(id, order)| (id.to_string(), *order)).collect()
    }

    #[test]
    fn test_normal_after_iterator_counts_as_iterator() {
        let txs = vec![invoke_tx("a", "c", "m"), invoke_tx("b", "c", "m"), invoke_tx("c", "c", "m")];
        let exec_orders = orders(&[
            ("a", ExecOrderType::Normal),
            ("b", ExecOrderType::Iterator),
            ("c", ExecOrderType::Normal),
        ]);
        let counts = classify_exec_orders(&txs, &exec_orders, |_| false, false).unwrap();
        assert_eq!(
            counts,
            OrderCounts {
                normal: 1,
                iterator: 2,
                charge_gas: 0
            }
        );
    }

    #[test]
    fn test_charge_gas_must_be_last_and_expected() {
        let txs = vec![invoke_tx("a", "c", "m"), invoke_tx("b", "c", "m")];
        let charge_first = orders(&[("a", ExecOrderType::ChargeGas), ("b", ExecOrderType::Normal)]);
        assert!(matches!(
            classify_exec_orders(&txs, &charge_first, |_| false, true),
            Err(SchedulerError::DagMismatch(_))
        ));

        let no_charge = orders(&[("a", ExecOrderType::Normal), ("b", ExecOrderType::Normal)]);
        assert!(classify_exec_orders(&txs, &no_charge, |_| false, true).is_err());
        assert!(classify_exec_orders(&txs, &no_charge, |_| false, false).is_ok());
    }

    #[test]
    fn test_serial_tail_and_charge_vertex() {
        let mut dag = Dag {
            vertexes: vec![DagNeighbors::default(), DagNeighbors::default()],
        };
        append_serial_tail(&mut dag, 2);
        dag.push_after_all();

        let neighbors: Vec<Vec<u32>> = dag.vertexes.iter().map(|v| v.neighbors.clone()).collect();
        assert_eq!(
            neighbors,
            vec![vec![], vec![], vec![0, 1], vec![2], vec![0, 1, 2, 3]]
        );
    }

    #[test]
    fn test_compare_reports_vertex() {
        let expected = Dag {
            vertexes: vec![DagNeighbors::default(), DagNeighbors::default()],
        };
        let received = Dag {
            vertexes: vec![DagNeighbors::default(), DagNeighbors::new(vec![0])],
        };
        let err = compare_dag(&expected, &received).unwrap_err();
        assert!(err.to_string().contains("vertex 1"));
        assert!(compare_dag(&expected, &expected).is_ok());
    }
}
