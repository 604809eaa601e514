//! SQLite persistence for generation snapshots and fitness scores.
//!
//! A generation's population and aggregate scores are written before
//! selection runs, so a restarted run resumes from the newest completed
//! generation instead of repeating evolutionary work.

use botforge_core::{Error, Genotype, GenotypeId, Result};
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generations (
                generation INTEGER PRIMARY KEY,
                population BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                generation INTEGER NOT NULL,
                genotype_id TEXT NOT NULL,
                fitness REAL NOT NULL,
                PRIMARY KEY (generation, genotype_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Persist one evaluated generation: the population snapshot plus the
    /// aggregate fitness of each genotype.
    pub async fn store_generation(
        &self,
        generation: u64,
        population: &[Genotype],
        scores: &[(GenotypeId, f64)],
    ) -> Result<()> {
        let population_bytes = bincode::serialize(population)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO generations (generation, population, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(generation) DO UPDATE SET
                population = ?2,
                created_at = ?3
            "#,
        )
        .bind(generation as i64)
        .bind(&population_bytes)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to store generation: {}", e)))?;

        for (genotype_id, fitness) in scores {
            sqlx::query(
                r#"
                INSERT INTO scores (generation, genotype_id, fitness)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(generation, genotype_id) DO UPDATE SET fitness = ?3
                "#,
            )
            .bind(generation as i64)
            .bind(genotype_id.0.to_string())
            .bind(*fitness)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to store score: {}", e)))?;
        }

        Ok(())
    }

    /// Newest persisted generation, if any.
    pub async fn latest_generation(&self) -> Result<Option<(u64, Vec<Genotype>)>> {
        let row = sqlx::query(
            "SELECT generation, population FROM generations ORDER BY generation DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get latest generation: {}", e)))?;

        match row {
            Some(row) => {
                let generation: i64 = row.get("generation");
                let population_bytes: Vec<u8> = row.get("population");
                let population: Vec<Genotype> = bincode::deserialize(&population_bytes)?;
                Ok(Some((generation as u64, population)))
            }
            None => Ok(None),
        }
    }

    pub async fn scores_for(&self, generation: u64) -> Result<HashMap<GenotypeId, f64>> {
        let rows = sqlx::query("SELECT genotype_id, fitness FROM scores WHERE generation = ?1")
            .bind(generation as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get scores: {}", e)))?;

        let mut scores = HashMap::new();
        for row in rows {
            let id_str: String = row.get("genotype_id");
            let id = GenotypeId(
                uuid::Uuid::parse_str(&id_str)
                    .map_err(|e| Error::Database(format!("Invalid genotype ID: {}", e)))?,
            );
            let fitness: f64 = row.get("fitness");
            scores.insert(id, fitness);
        }
        Ok(scores)
    }

    pub async fn count_generations(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM generations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count generations: {}", e)))?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botforge_core::GenotypeSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    async fn create_test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn test_population(n: usize) -> Vec<Genotype> {
        let spec = GenotypeSpec::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        (0..n).map(|_| Genotype::random(&spec, &mut rng)).collect()
    }

    #[tokio::test]
    async fn store_and_resume_generation() {
        let db = create_test_db().await;
        let population = test_population(3);
        let scores: Vec<_> = population
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id, i as f64 * 1.5))
            .collect();

        db.store_generation(4, &population, &scores).await.unwrap();

        let (generation, restored) = db.latest_generation().await.unwrap().unwrap();
        assert_eq!(generation, 4);
        assert_eq!(restored.len(), 3);
        assert_eq!(restored[0].states, population[0].states);

        let restored_scores = db.scores_for(4).await.unwrap();
        assert_eq!(restored_scores.len(), 3);
        assert_eq!(restored_scores[&population[1].id], 1.5);
    }

    #[tokio::test]
    async fn latest_generation_wins() {
        let db = create_test_db().await;
        let old = test_population(2);
        let new = test_population(2);

        db.store_generation(0, &old, &[]).await.unwrap();
        db.store_generation(1, &new, &[]).await.unwrap();

        let (generation, population) = db.latest_generation().await.unwrap().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(population[0].id, new[0].id);
        assert_eq!(db.count_generations().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_database_has_no_generations() {
        let db = create_test_db().await;
        assert!(db.latest_generation().await.unwrap().is_none());
        assert_eq!(db.count_generations().await.unwrap(), 0);
    }
}
