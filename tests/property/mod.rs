mod restoration;
