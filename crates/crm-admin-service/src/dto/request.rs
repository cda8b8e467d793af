//! 请求 DTO 定义
//!
//! 所有 REST API 的请求参数和请求体结构

use chrono::{DateTime, Utc};
use crm_core::models::{
    ClientFilter, ClientStatus, ClientUpdate, ExtensionFilter, ExtensionStatus, NewRuleDetail,
    Paging, PlatformKind, PoolFilter, PoolStatus, SettlementFilter, SettlementStatus, TodoFilter,
    TodoStatus, UserFilter, UserRole, UserStatus, UserUpdate,
};
use crm_core::service::{CreateClientInput, CreatePoolInput, CreateSettlementInput, CreateTodoInput};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use validator::Validate;

/// 区分"字段缺失"与"显式 null"：缺失为 None，null 为 Some(None)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 分页参数
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationParams {
    pub fn paging(&self) -> Paging {
        Paging::new(self.page, self.page_size)
    }

    /// 规范化后的页码（从 1 开始）
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.paging().limit
    }
}

// ============================================
// 认证与用户
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50, message = "用户名长度必须在 1-50 之间"))]
    pub username: String,
    #[validate(length(min = 1, max = 100, message = "密码长度必须在 1-100 之间"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "用户名长度必须在 3-50 之间"))]
    pub username: String,
    #[validate(length(min = 8, max = 100, message = "密码长度必须在 8-100 之间"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "显示名称长度必须在 1-100 之间"))]
    pub display_name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    pub role: UserRole,
    pub supervisor_id: Option<i64>,
    #[validate(range(min = 0, max = 5, message = "星级必须在 0-5 之间"))]
    #[serde(default)]
    pub star_level: i32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "显示名称长度必须在 1-100 之间"))]
    pub display_name: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    /// 传 null 清除上级
    #[serde(default, deserialize_with = "double_option")]
    pub supervisor_id: Option<Option<i64>>,
    #[validate(range(min = 0, max = 5, message = "星级必须在 0-5 之间"))]
    pub star_level: Option<i32>,
}

impl From<UpdateUserRequest> for UserUpdate {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            display_name: req.display_name,
            email: req.email,
            role: req.role,
            status: req.status,
            supervisor_id: req.supervisor_id,
            star_level: req.star_level,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, max = 100, message = "密码长度必须在 8-100 之间"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub keyword: Option<String>,
}

impl From<UserListQuery> for UserFilter {
    fn from(q: UserListQuery) -> Self {
        Self {
            role: q.role,
            status: q.status,
            keyword: q.keyword,
        }
    }
}

// ============================================
// 客户
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub agent_id: Option<i64>,
    #[validate(length(min = 1, max = 100, message = "名长度必须在 1-100 之间"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "姓长度必须在 1-100 之间"))]
    pub last_name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    #[validate(length(max = 30, message = "电话长度不能超过 30"))]
    pub phone: Option<String>,
    #[validate(length(equal = 2, message = "州代码必须为两位字母"))]
    pub state: Option<String>,
    #[validate(length(max = 2000, message = "备注长度不能超过 2000"))]
    pub notes: Option<String>,
}

impl From<CreateClientRequest> for CreateClientInput {
    fn from(req: CreateClientRequest) -> Self {
        Self {
            agent_id: req.agent_id,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            phone: req.phone,
            state: req.state,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 100, message = "名长度必须在 1-100 之间"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "姓长度必须在 1-100 之间"))]
    pub last_name: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    #[validate(length(max = 30, message = "电话长度不能超过 30"))]
    pub phone: Option<String>,
    #[validate(length(equal = 2, message = "州代码必须为两位字母"))]
    pub state: Option<String>,
    #[validate(length(max = 2000, message = "备注长度不能超过 2000"))]
    pub notes: Option<String>,
}

impl From<UpdateClientRequest> for ClientUpdate {
    fn from(req: UpdateClientRequest) -> Self {
        Self {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            phone: req.phone,
            state: req.state.map(|s| s.to_ascii_uppercase()),
            notes: req.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListQuery {
    pub status: Option<ClientStatus>,
    pub agent_id: Option<i64>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub overdue_only: bool,
}

impl From<ClientListQuery> for ClientFilter {
    fn from(q: ClientListQuery) -> Self {
        Self {
            status: q.status,
            agent_id: q.agent_id,
            keyword: q.keyword,
            overdue_only: q.overdue_only,
        }
    }
}

/// 退回、拒绝、结案等需要填写说明的操作
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 1000, message = "说明长度必须在 1-1000 之间"))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAgentRequest {
    pub agent_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRuleRequest {
    /// 为空表示解除分润规则
    pub rule_id: Option<i64>,
}

// ============================================
// 平台
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddPlatformRequest {
    pub kind: PlatformKind,
    #[validate(length(max = 100, message = "平台账户标识长度不能超过 100"))]
    pub account_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBalanceRequest {
    pub balance: Decimal,
}

// ============================================
// 延期
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExtensionRequest {
    pub client_id: i64,
    pub days: i32,
    #[validate(length(min = 1, max = 1000, message = "申请原因长度必须在 1-1000 之间"))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionListQuery {
    pub client_id: Option<i64>,
    pub status: Option<ExtensionStatus>,
}

impl From<ExtensionListQuery> for ExtensionFilter {
    fn from(q: ExtensionListQuery) -> Self {
        Self {
            client_id: q.client_id,
            status: q.status,
            agent_id: None,
        }
    }
}

/// 审批意见
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[validate(length(max = 1000, message = "审批意见长度不能超过 1000"))]
    pub note: Option<String>,
}

// ============================================
// 奖金池
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub client_id: i64,
    pub closer_id: Option<i64>,
    pub total_amount: Decimal,
    pub direct_amount: Decimal,
    #[validate(length(max = 500, message = "备注长度不能超过 500"))]
    pub note: Option<String>,
}

impl From<CreatePoolRequest> for CreatePoolInput {
    fn from(req: CreatePoolRequest) -> Self {
        Self {
            client_id: req.client_id,
            closer_id: req.closer_id,
            total_amount: req.total_amount,
            direct_amount: req.direct_amount,
            note: req.note,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolListQuery {
    pub client_id: Option<i64>,
    pub status: Option<PoolStatus>,
}

impl From<PoolListQuery> for PoolFilter {
    fn from(q: PoolListQuery) -> Self {
        Self {
            client_id: q.client_id,
            status: q.status,
        }
    }
}

// ============================================
// 分润
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RuleDetailRequest {
    pub recipient_id: Option<i64>,
    #[validate(length(min = 1, max = 100, message = "分润项名称长度必须在 1-100 之间"))]
    pub label: String,
    pub percentage: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 100, message = "规则名称长度必须在 1-100 之间"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(nested)]
    pub details: Vec<RuleDetailRequest>,
}

impl CreateRuleRequest {
    pub fn rule_details(&self) -> Vec<NewRuleDetail> {
        self.details
            .iter()
            .map(|d| NewRuleDetail {
                recipient_id: d.recipient_id,
                label: d.label.clone(),
                percentage: d.percentage,
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleListQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatusRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSettlementRequest {
    pub client_id: i64,
    #[validate(length(min = 1, max = 50, message = "结算周期长度必须在 1-50 之间"))]
    pub period_label: String,
    pub profit_amount: Decimal,
    pub rule_id: Option<i64>,
}

impl From<CreateSettlementRequest> for CreateSettlementInput {
    fn from(req: CreateSettlementRequest) -> Self {
        Self {
            client_id: req.client_id,
            period_label: req.period_label,
            profit_amount: req.profit_amount,
            rule_id: req.rule_id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementListQuery {
    pub client_id: Option<i64>,
    pub status: Option<SettlementStatus>,
}

impl From<SettlementListQuery> for SettlementFilter {
    fn from(q: SettlementListQuery) -> Self {
        Self {
            client_id: q.client_id,
            status: q.status,
        }
    }
}

// ============================================
// 待办与通知
// ============================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度必须在 1-200 之间"))]
    pub title: String,
    #[validate(length(max = 2000, message = "描述长度不能超过 2000"))]
    pub description: Option<String>,
    pub assignee_id: Option<i64>,
    pub client_id: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
}

impl From<CreateTodoRequest> for CreateTodoInput {
    fn from(req: CreateTodoRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            assignee_id: req.assignee_id,
            client_id: req.client_id,
            due_at: req.due_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListQuery {
    pub assignee_id: Option<i64>,
    pub client_id: Option<i64>,
    pub status: Option<TodoStatus>,
    #[serde(default)]
    pub overdue_only: bool,
}

impl From<TodoListQuery> for TodoFilter {
    fn from(q: TodoListQuery) -> Self {
        Self {
            assignee_id: q.assignee_id,
            client_id: q.client_id,
            status: q.status,
            overdue_only: q.overdue_only,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

// ============================================
// 检索与审计
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

/// 操作日志查询过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogFilter {
    pub operator_id: Option<i64>,
    pub module: Option<String>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}
