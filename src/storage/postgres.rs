use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::storage::traits::{AgentFilter, Page, Storage};
use crate::types::{Agent, AgentId, RefreshEntry, SecurityInfo, Session, StateInfo};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/V001__initial_schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_agent(r: &PgRow) -> Result<Agent> {
    let state: StateInfo = serde_json::from_value(r.get("state"))?;
    let security: SecurityInfo = serde_json::from_value(r.get("security"))?;
    Ok(Agent {
        id: r.get("id"),
        username: r.get("username"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
        display_name: r.get("display_name"),
        third_party_auth: r.get("third_party_auth"),
        base_url: r.get("base_url"),
        state,
        security,
        hidden: r.get("hidden"),
        deleted: r.get("deleted"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

const AGENT_COLUMNS: &str = "id, username, email, password_hash, display_name, \
     third_party_auth, base_url, state, security, hidden, deleted, created_at, updated_at";

fn push_filter(qb: &mut QueryBuilder<Postgres>, filter: &AgentFilter) {
    if !filter.include_hidden {
        qb.push(" AND NOT hidden");
    }
    if let Some(state) = filter.state {
        qb.push(" AND state->>'current' = ")
            .push_bind(state.as_str().to_string());
    }
    if let Some(q) = &filter.q {
        let pattern = format!("%{}%", q);
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR display_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn create_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, username, email, password_hash, display_name,
                third_party_auth, base_url, state, security, hidden, deleted,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(agent.id)
        .bind(&agent.username)
        .bind(&agent.email)
        .bind(&agent.password_hash)
        .bind(&agent.display_name)
        .bind(&agent.third_party_auth)
        .bind(&agent.base_url)
        .bind(serde_json::to_value(&agent.state)?)
        .bind(serde_json::to_value(&agent.security)?)
        .bind(agent.hidden)
        .bind(agent.deleted)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE id = $1 AND NOT deleted",
            AGENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE username = $1 AND NOT deleted",
            AGENT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE email = $1 AND NOT deleted",
            AGENT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn update_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agents
            SET username = $2, email = $3, password_hash = $4, display_name = $5,
                third_party_auth = $6, base_url = $7, state = $8, security = $9,
                hidden = $10, deleted = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(agent.id)
        .bind(&agent.username)
        .bind(&agent.email)
        .bind(&agent.password_hash)
        .bind(&agent.display_name)
        .bind(&agent.third_party_auth)
        .bind(&agent.base_url)
        .bind(serde_json::to_value(&agent.state)?)
        .bind(serde_json::to_value(&agent.security)?)
        .bind(agent.hidden)
        .bind(agent.deleted)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_agents(&self, filter: &AgentFilter, page: Page) -> Result<(Vec<Agent>, u64)> {
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM agents WHERE NOT deleted");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select_qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM agents WHERE NOT deleted",
            AGENT_COLUMNS
        ));
        push_filter(&mut select_qb, filter);
        select_qb
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit.max(0))
            .push(" OFFSET ")
            .push_bind(page.offset.max(0));
        let rows = select_qb.build().fetch_all(&self.pool).await?;

        let agents = rows.iter().map(row_to_agent).collect::<Result<Vec<_>>>()?;
        Ok((agents, total as u64))
    }

    async fn delete_agent(&self, id: AgentId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agents SET deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, agent_id, identity, refresh_token, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (token) DO UPDATE
            SET identity = EXCLUDED.identity, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&session.token)
        .bind(session.agent_id)
        .bind(serde_json::to_value(&session.identity)?)
        .bind(&session.refresh_token)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, agent_id, identity, refresh_token, issued_at, expires_at \
             FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Session {
                token: r.get("token"),
                agent_id: r.get("agent_id"),
                identity: serde_json::from_value(r.get("identity"))?,
                refresh_token: r.get("refresh_token"),
                issued_at: r.get("issued_at"),
                expires_at: r.get("expires_at"),
            })),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_refresh(&self, entry: &RefreshEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, agent_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.token)
        .bind(entry.agent_id)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_refresh(&self, token: &str) -> Result<Option<RefreshEntry>> {
        let row = sqlx::query(
            "SELECT token, agent_id, expires_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RefreshEntry {
            token: r.get("token"),
            agent_id: r.get("agent_id"),
            expires_at: r.get("expires_at"),
        }))
    }

    async fn delete_refresh(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
