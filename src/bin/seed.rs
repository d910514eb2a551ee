//! Reset the inventory and load sample data.
//!
//! Deletes all requests, history and components, makes sure the default
//! accounts exist and inserts the sample components. Accounts are never
//! deleted. Their password comes from `SEED_PASSWORD`, or is generated and
//! printed once when the variable is unset.

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sqlx::postgres::PgPoolOptions;

use challengers_tracker::{
    config::AppConfig,
    models::{component::NewComponent, user::NewUser, Role},
    repository::Repository,
    services::users::hash_password,
};

struct SampleComponent {
    code: &'static str,
    name: &'static str,
    category: &'static str,
    description: &'static str,
    days: i32,
}

const COMPONENTS: &[SampleComponent] = &[
    SampleComponent {
        code: "ARD-001",
        name: "Arduino Uno R3",
        category: "Microcontrollers",
        description: "ATmega328P board with USB cable",
        days: 7,
    },
    SampleComponent {
        code: "ARD-002",
        name: "Arduino Mega 2560",
        category: "Microcontrollers",
        description: "54 digital I/O pins, 16 analog inputs",
        days: 7,
    },
    SampleComponent {
        code: "ESP-001",
        name: "ESP32 DevKit V1",
        category: "Microcontrollers",
        description: "Dual core WiFi and Bluetooth board",
        days: 7,
    },
    SampleComponent {
        code: "SENS-001",
        name: "HC-SR04 Ultrasonic Sensor",
        category: "Sensors",
        description: "Distance measurement, 2cm to 400cm",
        days: 14,
    },
    SampleComponent {
        code: "SENS-002",
        name: "DHT22 Temperature Sensor",
        category: "Sensors",
        description: "Temperature and humidity sensor",
        days: 14,
    },
    SampleComponent {
        code: "MOT-001",
        name: "SG90 Servo Motor",
        category: "Motors",
        description: "Micro servo, 180 degree rotation",
        days: 14,
    },
    SampleComponent {
        code: "TOOL-001",
        name: "Digital Multimeter",
        category: "Tools",
        description: "Auto-ranging multimeter with probes",
        days: 3,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seed=info,challengers_tracker=info".into()),
        )
        .init();

    let config = AppConfig::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let repository = Repository::new(pool);

    let requests = repository.requests.delete_all().await?;
    let history = repository.history.delete_all().await?;
    let components = repository.components.delete_all().await?;
    tracing::info!(requests, history, components, "Cleared inventory");

    let password = match std::env::var("SEED_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => {
            let generated: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();
            println!("Generated password for seeded accounts: {}", generated);
            generated
        }
    };
    let password_hash = hash_password(&password)?;

    let accounts = [
        ("admin", "Workshop Admin", Role::Admin),
        ("member1", "Alex Member", Role::Member),
        ("member2", "Sam Member", Role::Member),
    ];
    for (username, name, role) in accounts {
        if repository.users.get_by_username(username).await?.is_some() {
            tracing::info!(username, "User already exists");
            continue;
        }
        repository
            .users
            .create(
                &NewUser {
                    username: username.to_string(),
                    name: name.to_string(),
                    email: format!("{}@challengers.local", username),
                    phone: None,
                    role,
                    email_notifications: true,
                    password_hash: password_hash.clone(),
                },
                Utc::now(),
            )
            .await?;
        tracing::info!(username, role = %role, "Created user");
    }

    for sample in COMPONENTS {
        repository
            .components
            .create(
                &NewComponent {
                    component_code: sample.code.to_string(),
                    name: sample.name.to_string(),
                    category: sample.category.to_string(),
                    description: sample.description.to_string(),
                    image_url: String::new(),
                    checkout_duration: sample.days,
                },
                Utc::now(),
            )
            .await?;
    }
    tracing::info!(count = COMPONENTS.len(), "Inserted sample components");

    Ok(())
}
