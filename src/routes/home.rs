use axum::response::Html;

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Welcome page HTML", content_type = "text/html")
    ),
    tag = "General"
)]
pub async fn root() -> Html<&'static str> {
    Html(r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>VideoStreamKit</title>
            <style>
                body {
                    display: flex;
                    flex-direction: column;
                    justify-content: center;
                    align-items: center;
                    height: 100vh;
                    margin: 0;
                    font-family: Arial, sans-serif;
                    background-color: #f0f0f0;
                }
                h1 {
                    color: #333;
                }
                p {
                    color: #666;
                }
            </style>
        </head>
        <body>
            <h1>Welcome to VideoStreamKit</h1>
            <p>Upload, publish and stream your videos.</p>
            <a href="/swagger-ui/" style="
                margin-top: 20px;
                padding: 10px 20px;
                background-color: #007bff;
                color: white;
                text-decoration: none;
                border-radius: 5px;
                font-weight: bold;
                transition: background-color 0.3s;
            " onmouseover="this.style.backgroundColor='#0056b3'" onmouseout="this.style.backgroundColor='#007bff'">
                Explore API Docs
            </a>
        </body>
        </html>
    "#)
}
