//! PDF 报表
//!
//! 使用 PDF 内置的 Helvetica 字体，只能输出 Latin-1 字符，其余字符替换为 `?`。

use crm_core::models::{Client, ClientPlatform, Settlement};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use rust_decimal::Decimal;

use crate::error::AdminError;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const LINE_HEIGHT: i64 = 16;
const LINES_PER_PAGE: usize = 45;

fn pdf_text(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| if (' '..='~').contains(&c) { c as u8 } else { b'?' })
        .collect()
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// 生成带标题的纯文本报表，超过一页自动分页
pub fn render_text_report(title: &str, lines: &[String]) -> Result<Vec<u8>, AdminError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    let total_pages = chunks.len();

    let mut kids: Vec<Object> = Vec::with_capacity(total_pages);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let page_id = add_page(&mut doc, pages_id, title, chunk, index + 1, total_pages)?;
        kids.push(Object::Reference(page_id));
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => Object::Integer(kids.len() as i64),
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| AdminError::Internal(format!("PDF 生成失败: {}", e)))?;
    Ok(buffer)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    title: &str,
    lines: &[String],
    page_no: usize,
    total_pages: usize,
) -> Result<ObjectId, AdminError> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(16)]),
        Operation::new(
            "Td",
            vec![Object::Integer(MARGIN), Object::Integer(PAGE_HEIGHT - MARGIN)],
        ),
        Operation::new("Tj", vec![Object::string_literal(pdf_text(title))]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
        Operation::new("TL", vec![Object::Integer(LINE_HEIGHT)]),
        Operation::new("T*", vec![]),
        Operation::new("T*", vec![]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(pdf_text(line))]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    // 页脚页码
    operations.extend([
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(8)]),
        Operation::new("Td", vec![Object::Integer(MARGIN), Object::Integer(MARGIN / 2)]),
        Operation::new(
            "Tj",
            vec![Object::string_literal(format!("Page {page_no} of {total_pages}"))],
        ),
        Operation::new("ET", vec![]),
    ]);

    let content = Content { operations }
        .encode()
        .map_err(|e| AdminError::Internal(format!("PDF 内容编码失败: {}", e)))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    }))
}

/// 分润结算单
pub fn settlement_statement(settlement: &Settlement, client: &Client) -> Result<Vec<u8>, AdminError> {
    let mut lines = vec![
        format!("Settlement #{}", settlement.id),
        format!("Client: {} (#{})", client.full_name(), client.id),
        format!("Period: {}", settlement.period_label),
        format!("Status: {}", settlement.status.as_str()),
        format!("Profit: {}", money(settlement.profit_amount)),
        format!("Created: {}", settlement.created_at.format("%Y-%m-%d %H:%M UTC")),
    ];
    if let Some(confirmed_at) = settlement.confirmed_at {
        lines.push(format!("Confirmed: {}", confirmed_at.format("%Y-%m-%d %H:%M UTC")));
    }
    lines.push(String::new());
    lines.push("Recipient                         Share %        Amount".to_string());
    for line in &settlement.lines {
        lines.push(format!(
            "{:<32}  {:>7}%  {:>12}",
            line.label,
            line.percentage.normalize().to_string(),
            money(line.amount)
        ));
    }
    let total: Decimal = settlement.lines.iter().map(|l| l.amount).sum();
    lines.push(format!("{:<32}  {:>8}  {:>12}", "Total", "", money(total)));

    render_text_report("Profit Share Statement", &lines)
}

/// 客户概要：基本信息与各平台验证状态、余额
pub fn client_summary(client: &Client, platforms: &[ClientPlatform]) -> Result<Vec<u8>, AdminError> {
    let mut lines = vec![
        format!("Client #{}: {}", client.id, client.full_name()),
        format!("Status: {}", client.status.as_str()),
        format!("Agent: #{}", client.agent_id),
        format!("State: {}", client.state.as_deref().unwrap_or("-")),
        format!("Email: {}", client.email.as_deref().unwrap_or("-")),
        format!("Phone: {}", client.phone.as_deref().unwrap_or("-")),
        format!("Intake deadline: {}", client.intake_deadline.format("%Y-%m-%d")),
        format!("Extensions used: {}", client.extension_count),
    ];
    if let Some(closed_at) = client.closed_at {
        lines.push(format!("Closed: {}", closed_at.format("%Y-%m-%d")));
    }
    lines.push(String::new());
    lines.push("Platform        Verification    Attempts        Balance".to_string());
    for platform in platforms {
        lines.push(format!(
            "{:<14}  {:<14}  {:>8}  {:>13}",
            platform.kind.display_name(),
            platform.status.as_str(),
            platform.attempts,
            money(platform.balance)
        ));
    }
    let total: Decimal = platforms.iter().map(|p| p.balance).sum();
    lines.push(format!("{:<14}  {:<14}  {:>8}  {:>13}", "Total", "", "", money(total)));

    render_text_report("Client Summary", &lines)
}
