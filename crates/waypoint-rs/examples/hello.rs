//! Hello world with a mounted sub-application and a scoped service
//!
//! ```text
//! cargo run -p waypoint-rs --example hello
//! curl http://127.0.0.1:8080/hello/ada
//! curl http://127.0.0.1:8080/static/css/site.css
//! ```

use waypoint_rs::http::Uri;
use waypoint_rs::prelude::*;

struct Greeter {
    greeting: String,
}

async fn hello(Path(name): Path<String>, greeter: Service<Greeter>) -> HttpResponse {
    HttpResponse::text(format!("{}, {}!", greeter.greeting, name))
}

#[derive(Deserialize, Validate)]
struct Signup {
    #[validate(length(min = 1, max = 64))]
    name: String,
    #[validate(email)]
    email: String,
}

async fn signup(cx: RouteContext) -> Result<HttpResponse, RouteError> {
    let signup = decode(&cx, &Validated::<Signup>::new()).await?;
    info!(name = %signup.name, "New signup");
    Ok(HttpResponse::json(&serde_json::json!({ "email": signup.email }))
        .with_status(StatusCode::CREATED))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let assets = |uri: Uri, _request: Request| async move {
        HttpResponse::text(format!("asset {}", uri.path()))
    };

    let app = Router::new()
        .get("/hello/{name}", hello)
        .post("/signup", signup)
        .mount("/static", assets)
        .provide_service(Greeter {
            greeting: "Hello".to_string(),
        });

    let config = ServerConfig::from_env()?;
    let dispatcher = app.handle(DefaultTransform::new(config.profile)).await?;
    waypoint_rs::run(dispatcher, &config).await
}
