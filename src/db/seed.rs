use crate::config::AppConfig;
use crate::db::{agents, catalog};
use crate::domain::models::RoleCode;
use crate::domain::password::hash_password;
use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

struct SeedCategory<'a> {
    code: &'a str,
    label: &'a str,
}

pub async fn seed_all(pool: &PgPool, config: &AppConfig) -> Result<()> {
    seed_roles(pool).await?;
    seed_categories(pool).await?;
    seed_admin(pool, config).await?;
    Ok(())
}

async fn seed_roles(pool: &PgPool) -> Result<()> {
    let roles = [(RoleCode::Admin, "Administrateur"), (RoleCode::Agent, "Agent")];
    for (code, label) in roles {
        sqlx::query(
            r#"
            INSERT INTO roles (id, code, label)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(label)
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn seed_categories(pool: &PgPool) -> Result<()> {
    let categories = vec![
        SeedCategory {
            code: "APTITUDES",
            label: "Aptitudes professionnelles",
        },
        SeedCategory {
            code: "COMPORTEMENT",
            label: "Comportement et savoir-être",
        },
        SeedCategory {
            code: "RENDEMENT",
            label: "Rendement",
        },
    ];

    for category in categories {
        sqlx::query(
            r#"
            INSERT INTO question_categories (id, code, label)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category.code)
        .bind(category.label)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Creates the bootstrap administrator when configured and absent.
async fn seed_admin(pool: &PgPool, config: &AppConfig) -> Result<()> {
    let Some(seed) = &config.seed_admin else {
        return Ok(());
    };

    if agents::find_agent_by_username(pool, &seed.username).await?.is_some() {
        return Ok(());
    }

    let role = catalog::find_role_by_code(pool, RoleCode::Admin)
        .await?
        .ok_or_else(|| anyhow::anyhow!("ADMIN role missing after seeding"))?;

    let hash = hash_password(&seed.password)?;

    let email = format!("{}@internal.local", seed.username);
    agents::insert_agent(
        pool,
        agents::NewAgent {
            matricule: "ADMIN-0001",
            username: &seed.username,
            email: &email,
            first_name: "Admin",
            last_name: "Système",
            role_id: role.id,
            hash: &hash,
            is_active: true,
        },
    )
    .await?;

    tracing::info!("Seeded bootstrap administrator '{}'", seed.username);
    Ok(())
}
