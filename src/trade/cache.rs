//! Account state held by a [`DataTrade`](super::DataTrade).

use std::collections::HashMap;

use crate::models::{
    AccountInfo, BalanceOperation, ExecutionReport, Order, OrderId, Position, SessionInfo,
};

#[derive(Debug, Default)]
pub(crate) struct TradeCache {
    session_info: Option<SessionInfo>,
    account_info: Option<AccountInfo>,
    orders: HashMap<OrderId, Order>,
    positions: HashMap<String, Position>,
}

impl TradeCache {
    pub(crate) fn session_info(&self) -> Option<SessionInfo> {
        self.session_info.clone()
    }

    pub(crate) fn set_session_info(&mut self, info: SessionInfo) {
        self.session_info = Some(info);
    }

    pub(crate) fn account_info(&self) -> Option<AccountInfo> {
        self.account_info.clone()
    }

    pub(crate) fn set_account_info(&mut self, info: AccountInfo) {
        self.account_info = Some(info);
    }

    pub(crate) fn replace_orders(&mut self, orders: Vec<Order>) {
        self.orders = orders
            .into_iter()
            .filter(|order| order.status.is_working())
            .map(|order| (order.order_id.clone(), order))
            .collect();
    }

    pub(crate) fn replace_positions(&mut self, positions: Vec<Position>) {
        self.positions = positions
            .into_iter()
            .filter(|position| !position.is_flat())
            .map(|position| (position.symbol.clone(), position))
            .collect();
    }

    /// Upsert the reported order, or drop it once it reaches a terminal status.
    pub(crate) fn apply_execution_report(&mut self, report: &ExecutionReport) {
        if report.is_terminal() {
            self.orders.remove(&report.order_id);
        } else {
            self.orders.insert(report.order_id.clone(), report.to_order());
        }
    }

    pub(crate) fn apply_position(&mut self, position: Position) {
        if position.is_flat() {
            self.positions.remove(&position.symbol);
        } else {
            self.positions.insert(position.symbol.clone(), position);
        }
    }

    pub(crate) fn apply_balance(&mut self, operation: &BalanceOperation) {
        if let Some(account) = self.account_info.as_mut() {
            account.balance = operation.balance;
        }
    }

    /// Orders by id.
    pub(crate) fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        orders
    }

    pub(crate) fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).cloned()
    }

    /// Positions by symbol.
    pub(crate) fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub(crate) fn position(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionType, OrderStatus, OrderType};
    use rust_decimal_macros::dec;

    fn report(id: &str, status: OrderStatus) -> ExecutionReport {
        ExecutionReport {
            order_id: id.into(),
            execution_type: ExecutionType::New,
            order_status: status,
            order_type: OrderType::Limit,
            symbol: "EURUSD".into(),
            price: Some(dec!(1.05)),
            initial_amount: dec!(1000),
            leaves_amount: dec!(1000),
            ..Default::default()
        }
    }

    #[test]
    fn test_execution_reports_upsert_and_remove() {
        let mut cache = TradeCache::default();
        cache.apply_execution_report(&report("1", OrderStatus::New));
        cache.apply_execution_report(&report("2", OrderStatus::New));
        assert_eq!(cache.orders().len(), 2);
        assert_eq!(cache.order("1").unwrap().price, Some(dec!(1.05)));

        cache.apply_execution_report(&report("1", OrderStatus::Canceled));
        assert!(cache.order("1").is_none());
        assert_eq!(cache.orders().len(), 1);
    }

    #[test]
    fn test_flat_positions_are_removed() {
        let mut cache = TradeCache::default();
        cache.apply_position(Position {
            symbol: "EURUSD".into(),
            buy_amount: dec!(1000),
            ..Default::default()
        });
        assert!(cache.position("EURUSD").is_some());

        cache.apply_position(Position {
            symbol: "EURUSD".into(),
            ..Default::default()
        });
        assert!(cache.position("EURUSD").is_none());
    }

    #[test]
    fn test_replace_drops_finished_orders() {
        let mut cache = TradeCache::default();
        cache.apply_execution_report(&report("9", OrderStatus::New));
        cache.replace_orders(vec![
            report("1", OrderStatus::New).to_order(),
            report("2", OrderStatus::Filled).to_order(),
        ]);
        let ids: Vec<_> = cache.orders().into_iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![OrderId::from("1")]);
    }

    #[test]
    fn test_balance_operation_updates_account() {
        let mut cache = TradeCache::default();
        cache.apply_balance(&BalanceOperation {
            balance: dec!(5),
            ..Default::default()
        });
        assert!(cache.account_info().is_none());

        cache.set_account_info(AccountInfo {
            balance: dec!(100),
            ..Default::default()
        });
        cache.apply_balance(&BalanceOperation {
            balance: dec!(150),
            transaction_amount: dec!(50),
            transaction_currency: "USD".into(),
        });
        assert_eq!(cache.account_info().unwrap().balance, dec!(150));
    }
}
