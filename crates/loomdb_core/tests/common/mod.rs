//! Shared fixture: a small Person/Car model with the commands the
//! integration tests drive.

use loomdb_core::{
    AttributeDef, CommandDef, EntityDef, ParamDef, RelationDef, ScalarType, Schema, Value,
};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber once per binary; `RUST_LOG` filters it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn people_schema() -> Schema {
    init_tracing();
    Schema::builder()
        .entity(
            EntityDef::builder("Person")
                .attribute(AttributeDef::new("name", ScalarType::Text).unique())
                .attribute(AttributeDef::new("age", ScalarType::Integer).nullable())
                .build(),
        )
        .entity(
            EntityDef::builder("Car")
                .attribute(AttributeDef::new("plate", ScalarType::Text).unique())
                .relation(
                    RelationDef::one("owner", "Person")
                        .nullable()
                        .reciprocal("owned_cars"),
                )
                .relation(RelationDef::many("drivers", "Person"))
                .build(),
        )
        .command(
            CommandDef::new("create_person")
                .param(ParamDef::required("name", ScalarType::Text))
                .param(ParamDef::optional("age", ScalarType::Integer))
                .handler(|txn, params| {
                    let mut builder = txn.insert("Person")?.set("name", params.text("name")?)?;
                    if !params.is_null("age")? {
                        builder = builder.set("age", params.integer("age")?)?;
                    }
                    let person = builder.done()?;
                    Ok(Value::Integer(person.id().as_u64() as i64))
                }),
        )
        .command(
            CommandDef::new("rename_person")
                .param(ParamDef::required("name", ScalarType::Text))
                .param(ParamDef::required("new_name", ScalarType::Text))
                .handler(|txn, params| {
                    let person = txn.find("Person", "name").equals_to(params.text("name")?)?;
                    txn.update(&person)?
                        .set("name", params.text("new_name")?)?
                        .done()?;
                    Ok(Value::Null)
                }),
        )
        .command(
            CommandDef::new("delete_person")
                .param(ParamDef::required("name", ScalarType::Text))
                .handler(|txn, params| {
                    let person = txn.find("Person", "name").equals_to(params.text("name")?)?;
                    txn.delete(&person)?;
                    Ok(Value::Null)
                }),
        )
        .command(
            CommandDef::new("create_car")
                .param(ParamDef::required("plate", ScalarType::Text))
                .param(ParamDef::optional("owner", ScalarType::Text))
                .handler(|txn, params| {
                    let owner = if params.is_null("owner")? {
                        None
                    } else {
                        Some(txn.find("Person", "name").equals_to(params.text("owner")?)?)
                    };
                    let mut builder = txn.insert("Car")?.set("plate", params.text("plate")?)?;
                    if let Some(owner) = &owner {
                        builder = builder.relate("owner", owner)?;
                    }
                    let car = builder.done()?;
                    Ok(Value::Integer(car.id().as_u64() as i64))
                }),
        )
        .command(
            CommandDef::new("set_owner")
                .param(ParamDef::required("plate", ScalarType::Text))
                .param(ParamDef::optional("owner", ScalarType::Text))
                .handler(|txn, params| {
                    let car = txn.find("Car", "plate").equals_to(params.text("plate")?)?;
                    if params.is_null("owner")? {
                        txn.update(&car)?.unrelate("owner")?.done()?;
                    } else {
                        let owner =
                            txn.find("Person", "name").equals_to(params.text("owner")?)?;
                        txn.update(&car)?.relate("owner", &owner)?.done()?;
                    }
                    Ok(Value::Null)
                }),
        )
        .command(
            CommandDef::new("add_drivers")
                .param(ParamDef::required("plate", ScalarType::Text))
                .param(ParamDef::required("drivers", ScalarType::Text).multi())
                .handler(|txn, params| {
                    let car = txn.find("Car", "plate").equals_to(params.text("plate")?)?;
                    let drivers = txn
                        .find("Person", "name")
                        .all_contained_in(params.list("drivers")?.to_vec())?;
                    let mut builder = txn.update(&car)?;
                    for driver in &drivers {
                        builder = builder.add("drivers", driver)?;
                    }
                    builder.done()?;
                    Ok(Value::Integer(drivers.len() as i64))
                }),
        )
        .command(
            CommandDef::new("delete_car")
                .param(ParamDef::required("plate", ScalarType::Text))
                .handler(|txn, params| {
                    let car = txn.find("Car", "plate").equals_to(params.text("plate")?)?;
                    txn.delete(&car)?;
                    Ok(Value::Null)
                }),
        )
        .build()
        .unwrap()
}
