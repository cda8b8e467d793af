//! 待办事项

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::{load_client, required_text};
use crate::error::{CrmError, Result};
use crate::models::{
    Actor, NewTodo, NotificationDraft, NotificationKind, Page, Paging, Todo, TodoFilter,
    TodoStatus,
};
use crate::repository::{ClientRepositoryTrait, TodoRepositoryTrait, UserRepositoryTrait};
use crate::service::NotificationService;

#[derive(Debug, Clone)]
pub struct CreateTodoInput {
    pub title: String,
    pub description: Option<String>,
    /// 为空时指派给自己
    pub assignee_id: Option<i64>,
    pub client_id: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
}

pub struct TodoService {
    todos: Arc<dyn TodoRepositoryTrait>,
    clients: Arc<dyn ClientRepositoryTrait>,
    users: Arc<dyn UserRepositoryTrait>,
    notifier: Arc<NotificationService>,
}

impl TodoService {
    pub fn new(
        todos: Arc<dyn TodoRepositoryTrait>,
        clients: Arc<dyn ClientRepositoryTrait>,
        users: Arc<dyn UserRepositoryTrait>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            todos,
            clients,
            users,
            notifier,
        }
    }

    #[instrument(skip(self, input), fields(actor = actor.user_id))]
    pub async fn create(&self, actor: &Actor, input: CreateTodoInput) -> Result<Todo> {
        let title = required_text(&input.title, "标题")?;
        let assignee_id = input.assignee_id.unwrap_or(actor.user_id);
        if assignee_id != actor.user_id {
            if !actor.is_staff() {
                return Err(CrmError::Forbidden("业务员只能给自己创建待办".to_string()));
            }
            let assignee = self
                .users
                .get(assignee_id)
                .await?
                .ok_or(CrmError::UserNotFound(assignee_id))?;
            if !assignee.is_active() {
                return Err(CrmError::Validation(format!("用户 {assignee_id} 已停用")));
            }
        }
        if let Some(client_id) = input.client_id {
            load_client(self.clients.as_ref(), actor, client_id).await?;
        }

        let todo = self
            .todos
            .create(&NewTodo {
                title,
                description: input.description,
                assignee_id,
                client_id: input.client_id,
                due_at: input.due_at,
                created_by: Some(actor.user_id),
            })
            .await?;

        if assignee_id != actor.user_id {
            let mut draft = NotificationDraft::new(
                NotificationKind::TodoAssigned,
                "新的待办",
                format!("{} 给你指派了待办: {}", actor.name, todo.title),
            );
            draft.client_id = todo.client_id;
            self.notifier.notify_user(assignee_id, draft).await;
        }

        info!(todo_id = todo.id, assignee_id, "待办已创建");
        Ok(todo)
    }

    /// 业务员只能看到指派给自己的待办
    pub async fn list(&self, actor: &Actor, mut filter: TodoFilter, paging: Paging) -> Result<Page<Todo>> {
        if let Some(agent_id) = actor.agent_scope() {
            filter.assignee_id = Some(agent_id);
        }
        self.todos.list(&filter, paging).await
    }

    pub async fn get(&self, actor: &Actor, id: i64) -> Result<Todo> {
        let todo = self.todos.get(id).await?.ok_or(CrmError::TodoNotFound(id))?;
        if !actor.is_staff() && todo.assignee_id != actor.user_id {
            return Err(CrmError::TodoNotFound(id));
        }
        Ok(todo)
    }

    pub async fn complete(&self, actor: &Actor, id: i64) -> Result<Todo> {
        self.finish(actor, id, TodoStatus::Done).await
    }

    pub async fn cancel(&self, actor: &Actor, id: i64) -> Result<Todo> {
        self.finish(actor, id, TodoStatus::Cancelled).await
    }

    /// 已完成或已取消的待办重新打开
    pub async fn reopen(&self, actor: &Actor, id: i64) -> Result<Todo> {
        let todo = self.get(actor, id).await?;
        if todo.status == TodoStatus::Open {
            return Err(CrmError::InvalidStatusTransition {
                entity: "待办",
                from: todo.status.as_str().to_string(),
                to: TodoStatus::Open.as_str().to_string(),
            });
        }
        let updated = self
            .todos
            .set_status(id, todo.status, TodoStatus::Open)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;
        info!(todo_id = id, "待办已重新打开");
        Ok(updated)
    }

    async fn finish(&self, actor: &Actor, id: i64, to: TodoStatus) -> Result<Todo> {
        let todo = self.get(actor, id).await?;
        if todo.status != TodoStatus::Open {
            return Err(CrmError::InvalidStatusTransition {
                entity: "待办",
                from: todo.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        let updated = self
            .todos
            .set_status(id, TodoStatus::Open, to)
            .await?
            .ok_or(CrmError::ConcurrentModification)?;
        info!(todo_id = id, status = to.as_str(), "待办状态已更新");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_fixtures::{agent, todo, user_with_role};
    use crate::models::{UserRole, UserStatus};
    use crate::repository::{
        MockClientRepositoryTrait, MockNotificationRepositoryTrait, MockTodoRepositoryTrait,
        MockUserRepositoryTrait,
    };

    fn service(todos: MockTodoRepositoryTrait, users: MockUserRepositoryTrait) -> TodoService {
        let mut notifications = MockNotificationRepositoryTrait::new();
        notifications
            .expect_create_many()
            .returning(|items| Ok(items.len() as u64));
        let notifier = Arc::new(NotificationService::new(
            Arc::new(notifications),
            Arc::new(MockUserRepositoryTrait::new()),
        ));
        TodoService::new(
            Arc::new(todos),
            Arc::new(MockClientRepositoryTrait::new()),
            Arc::new(users),
            notifier,
        )
    }

    fn input(assignee_id: Option<i64>) -> CreateTodoInput {
        CreateTodoInput {
            title: "回访客户".to_string(),
            description: None,
            assignee_id,
            client_id: None,
            due_at: None,
        }
    }

    #[tokio::test]
    async fn test_agent_creates_own_todo() {
        let mut todos = MockTodoRepositoryTrait::new();
        todos
            .expect_create()
            .withf(|t| t.assignee_id == 7 && t.created_by == Some(7))
            .returning(|t| Ok(todo(1, t.assignee_id, TodoStatus::Open)));

        let actor = agent(7, 0, None).actor();
        let created = service(todos, MockUserRepositoryTrait::new())
            .create(&actor, input(None))
            .await
            .unwrap();
        assert_eq!(created.assignee_id, 7);
    }

    #[tokio::test]
    async fn test_agent_cannot_assign_others() {
        let actor = agent(7, 0, None).actor();
        let err = service(MockTodoRepositoryTrait::new(), MockUserRepositoryTrait::new())
            .create(&actor, input(Some(8)))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_staff_cannot_assign_disabled_user() {
        let mut users = MockUserRepositoryTrait::new();
        users.expect_get().returning(|id| {
            let mut user = agent(id, 0, None);
            user.status = UserStatus::Disabled;
            Ok(Some(user))
        });
        let staff = user_with_role(1, UserRole::Backoffice).actor();
        let err = service(MockTodoRepositoryTrait::new(), users)
            .create(&staff, input(Some(8)))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_complete_only_open() {
        let mut todos = MockTodoRepositoryTrait::new();
        todos
            .expect_get()
            .returning(|id| Ok(Some(todo(id, 7, TodoStatus::Done))));
        let actor = agent(7, 0, None).actor();

        let err = service(todos, MockUserRepositoryTrait::new())
            .complete(&actor, 3)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
    }

    #[tokio::test]
    async fn test_foreign_todo_hidden() {
        let mut todos = MockTodoRepositoryTrait::new();
        todos
            .expect_get()
            .returning(|id| Ok(Some(todo(id, 8, TodoStatus::Open))));
        let actor = agent(7, 0, None).actor();

        let err = service(todos, MockUserRepositoryTrait::new())
            .cancel(&actor, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::TodoNotFound(3)));
    }

    #[tokio::test]
    async fn test_complete_open_todo() {
        let mut todos = MockTodoRepositoryTrait::new();
        todos
            .expect_get()
            .returning(|id| Ok(Some(todo(id, 7, TodoStatus::Open))));
        todos
            .expect_set_status()
            .withf(|_, from, to| *from == TodoStatus::Open && *to == TodoStatus::Done)
            .returning(|id, _, to| Ok(Some(todo(id, 7, to))));
        let actor = agent(7, 0, None).actor();

        let done = service(todos, MockUserRepositoryTrait::new())
            .complete(&actor, 3)
            .await
            .unwrap();
        assert_eq!(done.status, TodoStatus::Done);
    }

    #[tokio::test]
    async fn test_reopen_cancelled_todo() {
        let mut todos = MockTodoRepositoryTrait::new();
        todos
            .expect_get()
            .returning(|id| Ok(Some(todo(id, 7, TodoStatus::Cancelled))));
        todos
            .expect_set_status()
            .withf(|_, from, to| *from == TodoStatus::Cancelled && *to == TodoStatus::Open)
            .returning(|id, _, to| Ok(Some(todo(id, 7, to))));
        let actor = agent(7, 0, None).actor();

        let reopened = service(todos, MockUserRepositoryTrait::new())
            .reopen(&actor, 3)
            .await
            .unwrap();
        assert_eq!(reopened.status, TodoStatus::Open);
    }
}
