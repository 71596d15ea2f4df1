use catalog_api::adapters::dynamo::DynamoItemStore;
use catalog_api::config::LambdaConfig;
use catalog_api::handlers::delete::handle_delete_item;
use catalog_api::telemetry;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init();
    let config = LambdaConfig::from_env().map_err(Error::from)?;
    let store = DynamoItemStore::connect(&config).await;
    let store = &store;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<_, Error>(handle_delete_item(event.payload, store))
    }))
    .await
}
