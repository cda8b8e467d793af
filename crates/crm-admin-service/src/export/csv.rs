//! CSV 导出

use crm_core::models::{BonusAllocation, Client};
use serde::Serialize;

use crate::error::AdminError;

#[derive(Serialize)]
struct ClientRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    state: String,
    status: &'static str,
    agent_id: i64,
    intake_deadline: String,
    extension_count: i32,
    created_at: String,
}

#[derive(Serialize)]
struct AllocationRow {
    pool_id: i64,
    agent_id: String,
    kind: &'static str,
    star_level: i32,
    amount: String,
}

/// 以 = + - @ 开头的单元格在表格软件中会被当作公式执行，加前缀单引号
fn sanitize_cell(value: &str) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{value}"),
        _ => value.to_string(),
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, AdminError> {
    writer
        .into_inner()
        .map_err(|e| AdminError::Internal(format!("CSV 输出失败: {}", e)))
}

fn csv_error(e: csv::Error) -> AdminError {
    AdminError::Internal(format!("CSV 写入失败: {}", e))
}

pub fn clients_csv(clients: &[Client]) -> Result<Vec<u8>, AdminError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for client in clients {
        writer
            .serialize(ClientRow {
                id: client.id,
                first_name: sanitize_cell(&client.first_name),
                last_name: sanitize_cell(&client.last_name),
                email: sanitize_cell(client.email.as_deref().unwrap_or_default()),
                phone: sanitize_cell(client.phone.as_deref().unwrap_or_default()),
                state: sanitize_cell(client.state.as_deref().unwrap_or_default()),
                status: client.status.as_str(),
                agent_id: client.agent_id,
                intake_deadline: client.intake_deadline.to_rfc3339(),
                extension_count: client.extension_count,
                created_at: client.created_at.to_rfc3339(),
            })
            .map_err(csv_error)?;
    }
    // 空结果也输出表头
    if clients.is_empty() {
        writer
            .write_record([
                "id",
                "first_name",
                "last_name",
                "email",
                "phone",
                "state",
                "status",
                "agent_id",
                "intake_deadline",
                "extension_count",
                "created_at",
            ])
            .map_err(csv_error)?;
    }
    finish(writer)
}

pub fn allocations_csv(allocations: &[BonusAllocation]) -> Result<Vec<u8>, AdminError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if allocations.is_empty() {
        writer
            .write_record(["pool_id", "agent_id", "kind", "star_level", "amount"])
            .map_err(csv_error)?;
    }
    for allocation in allocations {
        writer
            .serialize(AllocationRow {
                pool_id: allocation.pool_id,
                agent_id: allocation
                    .agent_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                kind: allocation.kind.as_str(),
                star_level: allocation.star_level,
                amount: allocation.amount.to_string(),
            })
            .map_err(csv_error)?;
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crm_core::models::{AllocationKind, ClientStatus};
    use rust_decimal_macros::dec;

    fn client(id: i64, first_name: &str) -> Client {
        let now = Utc::now();
        Client {
            id,
            agent_id: 7,
            first_name: first_name.to_string(),
            last_name: "Lee".to_string(),
            email: Some("ann@example.com".to_string()),
            phone: None,
            state: Some("NJ".to_string()),
            notes: None,
            status: ClientStatus::Active,
            status_note: None,
            intake_deadline: now,
            extension_count: 1,
            profit_share_rule_id: None,
            closed_at: None,
            closure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_clients_csv() {
        let bytes = clients_csv(&[client(1, "Ann"), client(2, "=HYPERLINK(\"x\")")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert!(lines.next().unwrap().starts_with("id,first_name,last_name"));
        assert!(lines.next().unwrap().starts_with("1,Ann,Lee,ann@example.com,,NJ,active,7"));
        assert!(lines.next().unwrap().contains("'=HYPERLINK"));
    }

    #[test]
    fn test_state_column_is_sanitized() {
        let mut injected = client(3, "Bo");
        injected.state = Some("=cmd|' /C calc'!A0".to_string());
        let text = String::from_utf8(clients_csv(&[injected]).unwrap()).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains("'=cmd"), "{row}");
    }

    #[test]
    fn test_empty_export_has_header() {
        let text = String::from_utf8(clients_csv(&[]).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("id,"));
    }

    #[test]
    fn test_allocations_csv() {
        let allocations = vec![
            BonusAllocation {
                id: 1,
                pool_id: 3,
                agent_id: Some(7),
                kind: AllocationKind::Direct,
                star_level: 2,
                amount: dec!(400.00),
                created_at: Utc::now(),
            },
            BonusAllocation {
                id: 2,
                pool_id: 3,
                agent_id: None,
                kind: AllocationKind::House,
                star_level: 0,
                amount: dec!(600.00),
                created_at: Utc::now(),
            },
        ];
        let text = String::from_utf8(allocations_csv(&allocations).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "pool_id,agent_id,kind,star_level,amount");
        assert_eq!(lines[1], "3,7,direct,2,400.00");
        assert_eq!(lines[2], "3,,house,0,600.00");
    }

    #[test]
    fn test_sanitize_cell() {
        assert_eq!(sanitize_cell("-5"), "'-5");
        assert_eq!(sanitize_cell("@cmd"), "'@cmd");
        assert_eq!(sanitize_cell("plain"), "plain");
        assert_eq!(sanitize_cell(""), "");
    }
}
