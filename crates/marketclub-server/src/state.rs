use crate::services::community::CommunityService;
use crate::services::event::EventService;
use crate::services::post::PostService;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub jwt_secret: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:marketclub.db".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using default (insecure for production!)");
            "dev-secret-change-in-production".to_string()
        });

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Config {
            bind_address,
            database_url,
            jwt_secret,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub community_service: CommunityService,
    pub event_service: EventService,
    pub post_service: PostService,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let community_service = CommunityService::new(db.clone());
        let event_service = EventService::new(db.clone());
        let post_service = PostService::new(db.clone(), community_service.clone());

        Self {
            config,
            db,
            community_service,
            event_service,
            post_service,
        }
    }
}
